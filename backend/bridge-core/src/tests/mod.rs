mod bridge;
mod command;
mod ipc;
mod plugin;
mod serializer;

mod context;
mod loader;
mod permissions;

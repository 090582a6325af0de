mod pending;
mod protocol;

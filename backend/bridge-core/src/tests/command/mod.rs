mod builtin;
mod registrar;

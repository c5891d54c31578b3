mod error;
mod logger;
mod probe;

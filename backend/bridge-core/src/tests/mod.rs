mod batch;
mod clock;
mod config;
mod monitor;
mod queue;
mod retry;
mod wire;

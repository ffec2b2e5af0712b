#![no_std]

#[cfg(test)]
extern crate std;

pub mod channel;
pub mod command;
pub mod pid;
pub mod pwm;
pub mod sampler;
pub mod slot;
pub mod state;

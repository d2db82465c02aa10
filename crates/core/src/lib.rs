#![deny(warnings)]

pub mod analysis;
pub mod config;
pub mod correlation;
pub mod echo;
pub mod emotion;
pub mod facial;
pub mod pipeline;
pub mod report;
pub mod respond;
pub mod session;
pub mod turn;
pub mod util;

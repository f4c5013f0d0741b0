// Library interface for testing

pub mod audio;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod convert;
pub mod decode;
pub mod duration;
pub mod quality;
pub mod serve;
pub mod sniff;
pub mod status;

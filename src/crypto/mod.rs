//! Cryptographic utilities: key codecs and signature verification

mod keycodec;

pub use keycodec::*;

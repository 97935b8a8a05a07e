#![cfg_attr(not(test), no_std)]
//! Provisioning and session protocol for ATECC508A and ATSHA204A secure
//! elements: TempKey derivation, encrypted private key writes, public key
//! validation and zone personalization.

mod client;
mod command;
mod datalink;
pub mod device;
pub mod error;
mod exec_time;
#[cfg(feature = "pem")]
pub mod keyfile;
pub mod memory;
mod packet;
pub mod personalize;
pub mod privwrite;
pub mod tempkey;
pub mod verify;

pub use client::{AtCaClient, Memory, Random};
pub use command::{Block, Digest, Nonce, Serial, Word};
pub use datalink::I2cConfig;
pub use p256::ecdsa::Signature;
pub use packet::CRC16;
pub use signature;

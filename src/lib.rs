//! This crate implements a banked first-fit heap for bare-metal firmware.
//!
//!  - **Memory comes from fixed-size RAM banks.** The heap inspects a bank
//!    configuration register value and turns every 32 KiB bank assigned to
//!    general-purpose RAM into an independent allocation group.
//!
//!  - **Free space is recombined on every release.** A released block is
//!    merged with its free neighbors, so two adjacent free blocks never
//!    coexist.
//!
//!  - **Relocatable allocations can be compacted.** Allocations made through
//!    [`Heap::allocate_movable`] are addressed by a [`Handle`] and may be
//!    slid toward the start of their bank by [`Heap::compact`]. Plain
//!    allocations never move.
//!
//!  - **This crate supports `#![no_std]`.** Block headers are kept in a
//!    fixed-capacity table inside the [`Heap`] value, which can live in a
//!    `static`.
//!
//! # Examples
//!
//! ```rust
//! use bankheap::{BankConfig, Heap, BANK_SIZE};
//! use std::mem::MaybeUninit;
//!
//! let mut pool = vec![MaybeUninit::uninit(); BANK_SIZE * 2];
//!
//! // Banks 0 and 1 are general-purpose RAM.
//! let banks = BankConfig::from_raw(0b10_10);
//! let mut heap: Heap<'_> = Heap::INIT;
//! assert_eq!(heap.discover_in(&mut pool, banks), Ok(2));
//!
//! let ptr = heap.allocate(100).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0x5a, 100) };
//! heap.release(ptr).unwrap();
//! ```
//!
//! # Details
//!
//! ## Memory Layout
//!
//! The first [`GROUP_HDR_SIZE`] bytes of each bank are reserved for the group
//! header, and every block is preceded by [`BLOCK_HDR_SIZE`] reserved bytes.
//! The header contents live in the [`Heap`] value rather than in the bank
//! itself, but the reserved bytes keep the address arithmetic identical:
//! the payload of a block starts exactly one header after the block, and the
//! next block starts exactly where the previous payload ends.
//!
//! ## Reentrancy
//!
//! Every mutating method of [`Heap`] takes `&mut self`. [`GlobalHeap`]
//! serializes access through a [`RawLock`]; on a single-core
//! microcontroller the lock should mask interrupts.
//!
#![no_std]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

mod bank;
mod block;
mod error;
mod global;
mod group;
mod heap;
mod init;
mod region;
pub use self::{
    bank::{BankConfig, BankKind},
    block::{BlockInfo, Handle, BLOCK_HDR_SIZE},
    error::AllocError,
    global::*,
    group::{CompactReport, GroupStats, GROUP_HDR_SIZE},
    heap::{Cursor, Heap, DEFAULT_MAX_BLOCKS, MAX_REQUEST},
    init::*,
    region::{Region, BANK_COUNT, BANK_SIZE},
};

#[cfg(any(test, feature = "std"))]
extern crate std;

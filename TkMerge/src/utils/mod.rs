//! Utility functions
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

pub mod buffer_pool;
pub mod cancel;
pub mod hash;
pub mod progress;

pub use buffer_pool::{BufferPool, BufferSize, PooledBuffer};
pub use cancel::CancellationToken;
pub use hash::{checksum, key_hash, name_hash};
pub use progress::{Phase, Progress, ProgressCallback};

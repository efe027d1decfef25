// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs;
use std::io;

use super::{ensure_parent, file_inputs, first_output};
use crate::traits::Invocation;

/// Copies the first file input to the first declared output.
pub(crate) fn copy(invocation: &Invocation) -> io::Result<()> {
    let source = file_inputs(invocation).into_iter().next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "no file input to copy")
    })?;
    let target = first_output(invocation)?;
    ensure_parent(target)?;
    fs::copy(source, target)?;
    Ok(())
}

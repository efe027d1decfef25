// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs::{self, File};
use std::io::{self, Write};

use super::{ensure_parent, file_inputs, first_output};
use crate::traits::Invocation;

/// Appends every file input, in input-name then list order, into the first output.
pub(crate) fn concatenate(invocation: &Invocation) -> io::Result<()> {
    let sources = file_inputs(invocation);
    if sources.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no file inputs to concatenate",
        ));
    }
    let target = first_output(invocation)?;
    ensure_parent(target)?;

    let mut out = File::create(target)?;
    for source in sources {
        out.write_all(&fs::read(source)?)?;
    }
    out.flush()
}

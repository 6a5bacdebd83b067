//! Decode / encode variable-length uints

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("variable-length uint overflow")]
    VarUintOverflow,

    #[error("unexpected end-of-buffer")]
    UnexpectedEof,
}

/// Reads one uint from the front of `input`, advancing it past the consumed
/// bytes
pub fn read(input: &mut &[u8]) -> Result<u64, Error> {
    let mut output = 0u128;

    loop {
        let (&byte, rest) = input.split_first().ok_or(Error::UnexpectedEof)?;
        *input = rest;

        output = (output << 7) | (byte & 0x7F) as u128;

        if output > u64::MAX.into() {
            return Err(Error::VarUintOverflow);
        }

        if (byte & 0x80) == 0 {
            return Ok(output as u64);
        }
    }
}

pub fn write(output: &mut Vec<u8>, mut num: u64) {
    let mut chunk = vec![num as u8 & 0x7F];
    num /= 128;
    while num > 0 {
        chunk.push((num & 0x7F) as u8 | 0x80);
        num /= 128;
    }
    chunk.reverse();

    output.extend(chunk);
}

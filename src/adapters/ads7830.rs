//! ADS7830 8-bit I2C ADC as a single-pixel frame source.
//!
//! A photodiode front-end on one ADC channel reports the whole chamber as
//! one brightness value (0–255), so the rest of the pipeline sees a 1×1
//! frame.
//!
//! ## Protocol
//!
//! Write the command byte `0x84 | (channel << 4)` (single-ended, internal
//! reference off, converter on), then read one byte of result.

use embedded_hal::i2c::I2c;
use log::info;

use crate::app::ports::FrameSource;
use crate::error::{DeviceError, Error, Result};
use crate::sensors::Frame;

pub const DEFAULT_ADDRESS: u8 = 0x4B;
pub const DEFAULT_CHANNEL: u8 = 0;

const CMD_SINGLE_ENDED: u8 = 0x84;

pub struct Ads7830Source<I> {
    i2c: I,
    address: u8,
    channel: u8,
    open: bool,
}

impl<I: I2c> Ads7830Source<I> {
    pub fn new(i2c: I, address: u8, channel: u8) -> Result<Self> {
        if channel > 7 {
            return Err(Error::Config("ads7830 channel: must be 0..=7"));
        }
        Ok(Self {
            i2c,
            address,
            channel,
            open: false,
        })
    }

    fn command(&self) -> u8 {
        CMD_SINGLE_ENDED | (self.channel << 4)
    }

    fn convert(&mut self) -> core::result::Result<u8, DeviceError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write(self.address, &[self.command()])
            .map_err(|_| DeviceError::WriteFailed)?;
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|_| DeviceError::ReadFailed)?;
        Ok(buf[0])
    }
}

impl<I: I2c> FrameSource for Ads7830Source<I> {
    fn open(&mut self) -> core::result::Result<(), DeviceError> {
        // One throwaway conversion proves the device answers.
        self.convert().map_err(|_| DeviceError::Unavailable)?;
        self.open = true;
        info!(
            "ADS7830 at 0x{:02X} channel {} open",
            self.address, self.channel
        );
        Ok(())
    }

    fn read(&mut self) -> core::result::Result<Frame, DeviceError> {
        if !self.open {
            return Err(DeviceError::NotInitialised);
        }
        let raw = self.convert()?;
        Ok(Frame::uniform(1, 1, f32::from(raw)))
    }

    fn close(&mut self) {
        self.open = false;
    }
}

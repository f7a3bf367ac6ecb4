//! FT232H register buses over FTDI libMPSSE
//!
//! One [`MpsseChannel`] is opened per FT232H and shared by every sensor on
//! it. Each sensor gets its own select line on one of the high-byte GPIO
//! pins (ACBUS0-7), toggled around every register transaction.

use super::{selected, BusInterface, RegisterBus, SelectLine};
use crate::error::{ImuError, Result};
use crate::ffi::*;
use crate::registers::Register;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

/// ICM-20689 I2C address with AD0 pulled high
pub const ICM20689_I2C_ADDRESS: u8 = 0x69;

/// SPI read flag on the register address byte
const SPI_READ: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    I2c,
    Spi,
}

struct ChannelState {
    handle: FT_HANDLE,
    protocol: Protocol,
    gpio_dir: u8,
    gpio_value: u8,
}

// The handle is only ever used behind the channel mutex
unsafe impl Send for ChannelState {}

impl Drop for ChannelState {
    fn drop(&mut self) {
        unsafe {
            match self.protocol {
                Protocol::I2c => I2C_CloseChannel(self.handle),
                Protocol::Spi => SPI_CloseChannel(self.handle),
            };
        }
    }
}

fn check(status: FT_STATUS) -> Result<()> {
    if status != FT_OK {
        return Err(status.into());
    }
    Ok(())
}

/// Shared handle to an opened MPSSE channel
#[derive(Clone)]
pub struct MpsseChannel {
    inner: Arc<Mutex<ChannelState>>,
}

impl MpsseChannel {
    /// Open channel `index` in I2C mode
    ///
    /// # Arguments
    /// * `index` - Index of the I2C channel to use (usually 0)
    /// * `clock_hz` - Bus clock in Hz, 100 kHz to 1 MHz
    pub fn open_i2c(index: u32, clock_hz: u32) -> Result<Self> {
        let mut num_channels: DWORD = 0;
        check(unsafe { I2C_GetNumChannels(&mut num_channels) })?;
        Self::check_index(index, num_channels)?;

        let mut handle: FT_HANDLE = ptr::null_mut();
        check(unsafe { I2C_OpenChannel(index, &mut handle) })?;

        let mut config = ChannelConfig {
            ClockRate: clock_hz,
            LatencyTimer: 1, // 1ms latency (minimum stable value)
            Options: 0,
            Pin: 0,
            currentPinState: 0,
        };

        let status = unsafe { I2C_InitChannel(handle, &mut config) };
        if status != FT_OK {
            unsafe { I2C_CloseChannel(handle) };
            return Err(status.into());
        }

        log::info!("Opened MPSSE channel {} in I2C mode at {} Hz", index, clock_hz);
        Ok(Self::from_handle(handle, Protocol::I2c))
    }

    /// Open channel `index` in SPI mode 3
    pub fn open_spi(index: u32, clock_hz: u32) -> Result<Self> {
        let mut num_channels: DWORD = 0;
        check(unsafe { SPI_GetNumChannels(&mut num_channels) })?;
        Self::check_index(index, num_channels)?;

        let mut handle: FT_HANDLE = ptr::null_mut();
        check(unsafe { SPI_OpenChannel(index, &mut handle) })?;

        let mut config = ChannelConfig {
            ClockRate: clock_hz,
            LatencyTimer: 1,
            Options: SPI_CONFIG_OPTION_MODE3 | SPI_CONFIG_OPTION_CS_DBUS3 | SPI_CONFIG_OPTION_CS_ACTIVELOW,
            Pin: 0,
            currentPinState: 0,
        };

        let status = unsafe { SPI_InitChannel(handle, &mut config) };
        if status != FT_OK {
            unsafe { SPI_CloseChannel(handle) };
            return Err(status.into());
        }

        log::info!("Opened MPSSE channel {} in SPI mode 3 at {} Hz", index, clock_hz);
        Ok(Self::from_handle(handle, Protocol::Spi))
    }

    fn check_index(index: u32, num_channels: DWORD) -> Result<()> {
        if num_channels == 0 {
            return Err(ImuError::NoChannelsFound);
        }
        if index >= num_channels {
            return Err(ImuError::InvalidChannel(index));
        }
        Ok(())
    }

    fn from_handle(handle: FT_HANDLE, protocol: Protocol) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelState {
                handle,
                protocol,
                gpio_dir: 0,
                gpio_value: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drive one high-byte GPIO pin as an output
    fn set_gpio(&self, pin: u8, high: bool) -> Result<()> {
        let mut state = self.lock();
        let mask = 1u8 << pin;
        let dir = state.gpio_dir | mask;
        let value = if high {
            state.gpio_value | mask
        } else {
            state.gpio_value & !mask
        };
        check(unsafe { FT_WriteGPIO(state.handle, dir, value) })?;
        state.gpio_dir = dir;
        state.gpio_value = value;
        Ok(())
    }

    fn i2c_write(&self, address: u8, reg: u8, value: u8) -> Result<()> {
        let state = self.lock();
        let buffer = [reg, value];
        let mut transferred: DWORD = 0;

        let options = I2C_TRANSFER_OPTIONS_START_BIT
            | I2C_TRANSFER_OPTIONS_STOP_BIT
            | I2C_TRANSFER_OPTIONS_FAST_TRANSFER_BYTES;

        // With FAST_TRANSFER_BYTES the transferred count is in bits; only the status is meaningful
        check(unsafe {
            I2C_DeviceWrite(state.handle, address, 2, buffer.as_ptr(), &mut transferred, options)
        })
    }

    fn i2c_read(&self, address: u8, reg: u8) -> Result<u8> {
        let state = self.lock();
        let reg_buf = [reg];
        let mut transferred: DWORD = 0;

        // Write register address
        let options = I2C_TRANSFER_OPTIONS_START_BIT | I2C_TRANSFER_OPTIONS_BREAK_ON_NACK;
        check(unsafe {
            I2C_DeviceWrite(state.handle, address, 1, reg_buf.as_ptr(), &mut transferred, options)
        })?;

        // Read the data
        let mut data = [0u8];
        transferred = 0;
        let options = I2C_TRANSFER_OPTIONS_START_BIT
            | I2C_TRANSFER_OPTIONS_STOP_BIT
            | I2C_TRANSFER_OPTIONS_NACK_LAST_BYTE;
        check(unsafe {
            I2C_DeviceRead(state.handle, address, 1, data.as_mut_ptr(), &mut transferred, options)
        })?;

        if transferred != 1 {
            return Err(ImuError::TransferError {
                expected: 1,
                actual: transferred,
            });
        }
        Ok(data[0])
    }

    /// Full-duplex SPI transfer of `out`, returning the clocked-in bytes
    fn spi_transfer(&self, out: &[u8]) -> Result<Vec<u8>> {
        let state = self.lock();
        let mut input = vec![0u8; out.len()];
        let mut transferred: DWORD = 0;

        check(unsafe {
            SPI_ReadWrite(
                state.handle,
                input.as_mut_ptr(),
                out.as_ptr(),
                out.len() as DWORD,
                &mut transferred,
                SPI_TRANSFER_OPTIONS_SIZE_IN_BYTES,
            )
        })?;

        if transferred as usize != out.len() {
            return Err(ImuError::TransferError {
                expected: out.len() as u32,
                actual: transferred,
            });
        }
        Ok(input)
    }
}

/// Select line on one FT232H high-byte GPIO pin
pub struct GpioSelect {
    channel: MpsseChannel,
    pin: u8,
    active_high: bool,
}

impl GpioSelect {
    /// Configure `pin` (0-7) as an output and park it at its idle level
    pub fn new(channel: MpsseChannel, pin: u8, active_high: bool) -> Result<Self> {
        if pin > 7 {
            return Err(ImuError::InvalidParameter(format!(
                "GPIO pin must be 0-7, got {}",
                pin
            )));
        }
        channel.set_gpio(pin, !active_high)?;
        Ok(Self {
            channel,
            pin,
            active_high,
        })
    }
}

impl SelectLine for GpioSelect {
    fn assert_line(&mut self) -> Result<()> {
        self.channel.set_gpio(self.pin, self.active_high)
    }

    fn deassert_line(&mut self) -> Result<()> {
        self.channel.set_gpio(self.pin, !self.active_high)
    }
}

/// I2C bus where each sensor is enabled by an active-high select pin
///
/// The sensors share one I2C address; only the selected one answers. No
/// burst transfer, so FIFO drains fall back to single-byte reads.
pub struct I2cSelectBus {
    channel: MpsseChannel,
    address: u8,
    select: GpioSelect,
}

impl I2cSelectBus {
    pub fn new(channel: MpsseChannel, select_pin: u8) -> Result<Self> {
        let select = GpioSelect::new(channel.clone(), select_pin, true)?;
        Ok(Self {
            channel,
            address: ICM20689_I2C_ADDRESS,
            select,
        })
    }
}

impl RegisterBus for I2cSelectBus {
    fn read(&mut self, register: Register) -> Result<u8> {
        let channel = &self.channel;
        let address = self.address;
        selected(&mut self.select, || channel.i2c_read(address, register.addr()))
    }

    fn write(&mut self, register: Register, value: u8) -> Result<()> {
        let channel = &self.channel;
        let address = self.address;
        selected(&mut self.select, || channel.i2c_write(address, register.addr(), value))
    }

    fn interface(&self) -> BusInterface {
        BusInterface::I2c
    }
}

/// SPI bus with an active-low chip select per sensor and burst FIFO reads
pub struct SpiBus {
    channel: MpsseChannel,
    select: GpioSelect,
}

impl SpiBus {
    pub fn new(channel: MpsseChannel, select_pin: u8) -> Result<Self> {
        let select = GpioSelect::new(channel.clone(), select_pin, false)?;
        Ok(Self { channel, select })
    }
}

impl RegisterBus for SpiBus {
    fn read(&mut self, register: Register) -> Result<u8> {
        let channel = &self.channel;
        let response = selected(&mut self.select, || {
            channel.spi_transfer(&[register.addr() | SPI_READ, 0x00])
        })?;
        Ok(response[1])
    }

    fn write(&mut self, register: Register, value: u8) -> Result<()> {
        let channel = &self.channel;
        selected(&mut self.select, || {
            channel.spi_transfer(&[register.addr(), value]).map(|_| ())
        })
    }

    fn bulk_read(&mut self, register: Register, count: usize) -> Result<Vec<u8>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut out = vec![0u8; count + 1];
        out[0] = register.addr() | SPI_READ;

        let channel = &self.channel;
        let mut response = selected(&mut self.select, || channel.spi_transfer(&out))?;
        response.remove(0);
        Ok(response)
    }

    fn interface(&self) -> BusInterface {
        BusInterface::Spi
    }
}

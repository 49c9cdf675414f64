//! ESP-IDF backends for the HAL traits.
//!
//! Everything here is target-only; hosts use the stub implementations that
//! tests and the demo binary provide. Pin numbers come from `DeviceConfig`
//! and are opened as `AnyIOPin` at runtime.

use esp_idf_svc::hal::gpio::{AnyIOPin, Input, Output, PinDriver, Pull};
use esp_idf_svc::hal::i2c::I2cDriver;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::EspError;

use log::warn;

use crate::audio::codec::{CodecConfig, CodecDriver};
use crate::error::{Error, Result};
use crate::hal::paddle::{InputPin, PaddlePinConfig};
use crate::hal::tx::OutputPin;

fn map_esp_err(_err: EspError) -> Error {
    Error::Bus
}

fn any_io_pin(gpio: i32) -> Result<AnyIOPin> {
    if gpio < 0 {
        return Err(Error::InvalidArg);
    }
    // SAFETY: the pin number comes from the device config, which owns the
    // assignment; each pin is opened exactly once per boot.
    Ok(unsafe { AnyIOPin::new(gpio) })
}

/// GPIO input line.
pub struct EspInputPin {
    driver: PinDriver<'static, AnyIOPin, Input>,
}

impl InputPin for EspInputPin {
    fn level(&self) -> bool {
        self.driver.is_high()
    }
}

/// Open a paddle input pin with the configured pull resistor.
pub fn open_input_pin(config: &PaddlePinConfig) -> Result<Box<dyn InputPin>> {
    let pin = any_io_pin(config.gpio)?;
    let mut driver = PinDriver::input(pin).map_err(map_esp_err)?;
    let pull = match (config.pull_up, config.pull_down) {
        (true, true) => Pull::UpDown,
        (true, false) => Pull::Up,
        (false, true) => Pull::Down,
        (false, false) => Pull::Floating,
    };
    driver.set_pull(pull).map_err(map_esp_err)?;
    Ok(Box::new(EspInputPin { driver }))
}

/// GPIO output line.
pub struct EspOutputPin {
    driver: PinDriver<'static, AnyIOPin, Output>,
}

impl OutputPin for EspOutputPin {
    fn set_level(&mut self, high: bool) {
        let result = if high {
            self.driver.set_high()
        } else {
            self.driver.set_low()
        };
        if let Err(err) = result {
            warn!("tx gpio write failed: {err}");
        }
    }
}

/// Open the transmitter key output pin.
pub fn open_output_pin(gpio: i32) -> Result<Box<dyn OutputPin>> {
    let pin = any_io_pin(gpio)?;
    let driver = PinDriver::output(pin).map_err(map_esp_err)?;
    Ok(Box::new(EspOutputPin { driver }))
}

/// ISR edge delivery for the paddle lines.
///
/// Subscribes an any-edge interrupt per configured line; each handler reads
/// the raw level, resolves polarity, stamps the monotonic clock, and invokes
/// the (ISR-safe) callback. The returned guard keeps the subscriptions alive.
#[cfg(feature = "paddle-isr")]
pub mod isr {
    use super::*;
    use crate::clock;
    use crate::hal::paddle::{PaddleCallback, PaddleEvent, PaddleHalConfig, PaddleLine};
    use esp_idf_svc::hal::gpio::InterruptType;
    use esp_idf_svc::sys::gpio_get_level;

    pub struct PaddleIsr {
        drivers: Vec<PinDriver<'static, AnyIOPin, Input>>,
    }

    pub fn install(config: &PaddleHalConfig, callback: PaddleCallback) -> Result<PaddleIsr> {
        let mut drivers = Vec::new();
        let lines = [
            (PaddleLine::Dit, config.dit),
            (PaddleLine::Dah, config.dah),
            (PaddleLine::Key, config.key),
        ];
        for (line, pin_config) in lines {
            if !pin_config.is_connected() {
                continue;
            }
            let pin = any_io_pin(pin_config.gpio)?;
            let mut driver = PinDriver::input(pin).map_err(map_esp_err)?;
            let pull = match (pin_config.pull_up, pin_config.pull_down) {
                (true, true) => Pull::UpDown,
                (true, false) => Pull::Up,
                (false, true) => Pull::Down,
                (false, false) => Pull::Floating,
            };
            driver.set_pull(pull).map_err(map_esp_err)?;
            driver
                .set_interrupt_type(InterruptType::AnyEdge)
                .map_err(map_esp_err)?;

            let gpio = pin_config.gpio;
            let active_low = pin_config.active_low;
            let callback = callback.clone();
            // SAFETY: the handler only reads the pin, the monotonic clock,
            // and pushes into lock-free structures; no allocation, no
            // blocking, re-entrant across the three lines.
            unsafe {
                driver
                    .subscribe(move || {
                        let level = gpio_get_level(gpio) != 0;
                        callback(PaddleEvent {
                            line,
                            active: level != active_low,
                            timestamp_us: clock::now_us(),
                            raw_level: level as u32,
                        });
                    })
                    .map_err(map_esp_err)?;
            }
            driver.enable_interrupt().map_err(map_esp_err)?;
            drivers.push(driver);
        }
        Ok(PaddleIsr { drivers })
    }

    impl PaddleIsr {
        pub fn shutdown(mut self) {
            for driver in &mut self.drivers {
                let _ = driver.disable_interrupt();
            }
        }
    }
}

/// ES8311 I2C control address (AD0 = LOW)
pub const ES8311_ADDR: u8 = 0x18;

/// ES8311 register addresses
#[allow(dead_code)]
mod regs {
    pub const RESET: u8 = 0x00;
    pub const CLK_MANAGER1: u8 = 0x01;
    pub const CLK_MANAGER2: u8 = 0x02;
    pub const CLK_MANAGER3: u8 = 0x03;
    pub const CLK_MANAGER4: u8 = 0x04;
    pub const CLK_MANAGER5: u8 = 0x05;
    pub const CLK_MANAGER6: u8 = 0x06;
    pub const CLK_MANAGER7: u8 = 0x07;
    pub const CLK_MANAGER8: u8 = 0x08;
    pub const SDP_IN: u8 = 0x09;
    pub const SDP_OUT: u8 = 0x0A;
    pub const SYSTEM: u8 = 0x0B;
    pub const SYS_MODSEL: u8 = 0x0D;
    pub const DAC_MUTE: u8 = 0x17;
    pub const DAC_VOL: u8 = 0x18;
    pub const CHIP_ID1: u8 = 0xFD;
    pub const CHIP_ID2: u8 = 0xFE;
}

/// ES8311 codec over shared I2C plus an I2S writer supplied by the caller.
///
/// The I2S channel setup (sample rate, Philips stereo 16-bit, MCLK multiple
/// 256) happens in `main` where the peripherals are claimed; this driver
/// owns the control-plane registers and the data-plane writes.
pub struct Es8311Codec {
    i2c: I2cDriver<'static>,
    write_fn: Box<dyn FnMut(&[u8]) -> core::result::Result<usize, EspError> + Send>,
    volume_percent: u8,
    muted: bool,
}

impl Es8311Codec {
    pub fn new(
        i2c: I2cDriver<'static>,
        write_fn: Box<dyn FnMut(&[u8]) -> core::result::Result<usize, EspError> + Send>,
    ) -> Self {
        Self {
            i2c,
            write_fn,
            volume_percent: 0,
            muted: true,
        }
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        self.i2c
            .write(ES8311_ADDR, &[reg, value], I2C_TIMEOUT_TICKS)
            .map_err(map_esp_err)
    }

    fn apply_volume(&mut self) -> Result<()> {
        // DAC volume register is 0x00 (mute) to 0xFF (+32 dB); map percent
        // onto the 0 dB-top linear span the codec dev kit uses.
        let value = (self.volume_percent.min(100) as u16 * 0xBF / 100) as u8;
        self.write_reg(regs::DAC_VOL, value)
    }
}

pub const I2C_TIMEOUT_TICKS: u32 = 100;

/// I2C speed for the codec control channel.
pub fn codec_i2c_baudrate() -> Hertz {
    Hertz(100_000)
}

impl CodecDriver for Es8311Codec {
    fn initialize(&mut self, config: &CodecConfig) -> Result<()> {
        // Reset, clock from MCLK or SCLK, 16-bit Philips slots, DAC on.
        self.write_reg(regs::RESET, 0x1F)?;
        self.write_reg(regs::RESET, 0x00)?;
        self.write_reg(regs::CLK_MANAGER1, if config.use_mclk { 0x30 } else { 0x38 })?;
        self.write_reg(regs::CLK_MANAGER2, 0x00)?;
        self.write_reg(regs::SDP_OUT, 0x0C)?; // 16-bit I2S
        self.write_reg(regs::SYSTEM, 0x00)?;
        self.write_reg(regs::SYS_MODSEL, 0x02)?; // DAC only
        self.volume_percent = config.initial_volume_percent;
        self.apply_volume()?;
        // Start muted; the sidetone service unmutes on first start.
        self.set_mute(true)?;
        Ok(())
    }

    fn set_mute(&mut self, mute: bool) -> Result<()> {
        self.write_reg(regs::DAC_MUTE, if mute { 0x20 } else { 0x00 })?;
        self.muted = mute;
        Ok(())
    }

    fn set_volume(&mut self, volume_percent: u8) -> Result<()> {
        self.volume_percent = volume_percent;
        self.apply_volume()
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        // SAFETY: i16 samples reinterpreted as little-endian bytes for DMA.
        let bytes = unsafe {
            core::slice::from_raw_parts(samples.as_ptr() as *const u8, samples.len() * 2)
        };
        match (self.write_fn)(bytes) {
            Ok(written) if written == bytes.len() => Ok(()),
            Ok(_) => Err(Error::Timeout),
            Err(err) => {
                warn!("i2s write failed: {err}");
                Err(Error::Bus)
            }
        }
    }

    fn shutdown(&mut self) {
        let _ = self.set_mute(true);
        let _ = self.write_reg(regs::RESET, 0x1F);
    }
}

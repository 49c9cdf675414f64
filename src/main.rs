//! CwPaddleKeyer - Main entry point
//!
//! On ESP-IDF targets this wires the real HAL (GPIO paddles, TX line,
//! ES8311 codec over I2C/I2S) to the keying subsystem and runs the 1 kHz
//! main loop. Host builds run a short scripted paddle session through the
//! same pipeline against the capture codec and log the resulting timeline.

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::Arc;

    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::gpio::AnyIOPin;
    use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_svc::hal::i2s::config as i2s_config;
    use esp_idf_svc::hal::i2s::I2sDriver;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::sys::TickType_t;

    use cw_paddle_keyer::audio::codec::CodecDriver;
    use cw_paddle_keyer::audio::{SidetoneConfig, SidetoneService, ToneSettings};
    use cw_paddle_keyer::hal::esp;
    use cw_paddle_keyer::hal::{PaddleHal, TxKey};
    use cw_paddle_keyer::{clock, DeviceConfig, KeyingSubsystem};

    /// Sidetone-only rate; raise to 48 kHz when sharing with remote audio.
    const SAMPLE_RATE_HZ: u32 = 16_000;
    const I2S_WRITE_TIMEOUT: TickType_t = 100;

    // Codec wiring for the default ESP32-S3 board: I2C0 on 11/10,
    // I2S0 on 12/13/14/16.
    const I2C_SDA: i32 = 11;
    const I2C_SCL: i32 = 10;
    const I2S_MCLK: i32 = 12;
    const I2S_BCLK: i32 = 13;
    const I2S_LRCK: i32 = 14;
    const I2S_DOUT: i32 = 16;

    fn pin(gpio: i32) -> AnyIOPin {
        // SAFETY: board pin map, each pin claimed once at boot.
        unsafe { AnyIOPin::new(gpio) }
    }

    fn bring_up_sidetone(
        peripherals: Peripherals,
        config: &DeviceConfig,
        sidetone: &SidetoneService,
    ) -> cw_paddle_keyer::Result<()> {
        let i2c = I2cDriver::new(
            peripherals.i2c0,
            pin(I2C_SDA),
            pin(I2C_SCL),
            &I2cConfig::new().baudrate(esp::codec_i2c_baudrate()),
        )
        .map_err(|_| cw_paddle_keyer::Error::Bus)?;

        let std_config = i2s_config::StdConfig::philips(
            SAMPLE_RATE_HZ,
            i2s_config::DataBitWidth::Bits16,
        );
        let mut i2s = I2sDriver::new_std_tx(
            peripherals.i2s0,
            &std_config,
            pin(I2S_BCLK),
            pin(I2S_DOUT),
            Some(pin(I2S_MCLK)),
            pin(I2S_LRCK),
        )
        .map_err(|_| cw_paddle_keyer::Error::Bus)?;
        i2s.tx_enable().map_err(|_| cw_paddle_keyer::Error::Bus)?;

        let codec = esp::Es8311Codec::new(
            i2c,
            Box::new(move |bytes| i2s.write(bytes, I2S_WRITE_TIMEOUT)),
        );
        sidetone.initialize(
            SidetoneConfig {
                sample_rate_hz: SAMPLE_RATE_HZ,
                tone: ToneSettings {
                    sample_rate_hz: SAMPLE_RATE_HZ,
                    tone_frequency_hz: config.audio.sidetone_frequency_hz,
                    volume_percent: config.audio.sidetone_volume_percent,
                    fade_in_ms: config.audio.sidetone_fade_in_ms,
                    fade_out_ms: config.audio.sidetone_fade_out_ms,
                },
                spawn_pump_task: true,
            },
            Box::new(codec) as Box<dyn CodecDriver>,
        )
    }

    pub fn run() {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();

        log::info!("CwPaddleKeyer starting up");

        let config = DeviceConfig::default();
        let peripherals = match Peripherals::take() {
            Ok(peripherals) => peripherals,
            Err(err) => {
                log::error!("failed to take peripherals: {err}");
                return;
            }
        };

        // Codec bring-up failure is non-fatal: keying continues silent.
        let sidetone = Arc::new(SidetoneService::new());
        if let Err(err) = bring_up_sidetone(peripherals, &config, &sidetone) {
            log::warn!("sidetone bring-up failed: {err}");
        }

        let tx_pin = if config.output_pins.trx_gpio >= 0 {
            esp::open_output_pin(config.output_pins.trx_gpio).ok()
        } else {
            None
        };
        let tx = TxKey::new(tx_pin, config.output_pins.trx_active_high);

        let mut keying = KeyingSubsystem::new();
        if let Err(err) = keying.initialize(&config, tx, Some(sidetone.clone())) {
            log::error!("keying init failed: {err}");
            return;
        }

        let mut paddles = PaddleHal::new();
        let hal_config = KeyingSubsystem::build_paddle_hal_config(&config);
        if let Err(err) =
            paddles.initialize(&hal_config, esp::open_input_pin, keying.paddle_callback())
        {
            // Boot continues without keying input.
            log::warn!("paddle input init failed: {err}");
        }

        log::info!("entering main loop");
        loop {
            let now_us = clock::now_us();
            paddles.poll(now_us);
            keying.drain_paddle_events();
            keying.tick(now_us);
            FreeRtos::delay_ms(1);
        }
    }
}

#[cfg(target_os = "espidf")]
fn main() {
    firmware::run();
}

#[cfg(not(target_os = "espidf"))]
mod demo {
    use std::sync::Arc;

    use cw_paddle_keyer::audio::codec::FakeCodec;
    use cw_paddle_keyer::audio::{SidetoneConfig, SidetoneService, ToneSettings};
    use cw_paddle_keyer::hal::{PaddleEvent, PaddleLine, TxKey};
    use cw_paddle_keyer::{DeviceConfig, EventType, KeyingSubsystem};

    struct ScriptStep {
        at_us: i64,
        line: PaddleLine,
        active: bool,
    }

    /// A dit, then a second of squeeze.
    const SCRIPT: &[ScriptStep] = &[
        ScriptStep { at_us: 1_000, line: PaddleLine::Dit, active: true },
        ScriptStep { at_us: 70_000, line: PaddleLine::Dit, active: false },
        ScriptStep { at_us: 300_000, line: PaddleLine::Dit, active: true },
        ScriptStep { at_us: 300_000, line: PaddleLine::Dah, active: true },
        ScriptStep { at_us: 1_300_000, line: PaddleLine::Dit, active: false },
        ScriptStep { at_us: 1_300_000, line: PaddleLine::Dah, active: false },
    ];

    pub fn run() -> cw_paddle_keyer::Result<()> {
        env_logger::init();
        log::info!("CwPaddleKeyer host demo: scripted paddle session");

        let config = DeviceConfig::default();

        let sidetone = Arc::new(SidetoneService::new());
        let codec = FakeCodec::new();
        let codec_state = codec.state();
        sidetone.initialize(
            SidetoneConfig {
                sample_rate_hz: 48_000,
                tone: ToneSettings {
                    sample_rate_hz: 48_000,
                    tone_frequency_hz: config.audio.sidetone_frequency_hz,
                    volume_percent: config.audio.sidetone_volume_percent,
                    fade_in_ms: config.audio.sidetone_fade_in_ms,
                    fade_out_ms: config.audio.sidetone_fade_out_ms,
                },
                spawn_pump_task: false,
            },
            Box::new(codec),
        )?;

        let mut keying = KeyingSubsystem::new();
        keying.initialize(&config, TxKey::new(None, true), Some(sidetone.clone()))?;
        let paddle_input = keying.paddle_callback();

        // 2 s of virtual time at the 1 kHz main-loop cadence.
        let mut script = SCRIPT.iter().peekable();
        for now_us in (0..2_000_000i64).step_by(1_000) {
            while let Some(step) = script.peek() {
                if step.at_us > now_us {
                    break;
                }
                paddle_input(PaddleEvent {
                    line: step.line,
                    active: step.active,
                    timestamp_us: step.at_us,
                    raw_level: step.active as u32,
                });
                script.next();
            }
            keying.drain_paddle_events();
            keying.tick(now_us);
            // The audio pump runs every ~5 ms at 48 kHz.
            if now_us % 5_000 == 0 {
                let _ = sidetone.pump_once();
            }
        }

        let mut elements = 0;
        let mut squeezes = 0;
        keying.timeline().for_each(|event| match event.event_type {
            EventType::Keying if event.arg1 == 1 => elements += 1,
            EventType::Squeeze => squeezes += 1,
            _ => {}
        });
        let audio_samples = codec_state.lock().unwrap().captured_samples();

        log::info!(
            "session complete: {} elements, {} squeeze marks, {} paddle edges dropped, {} audio samples captured",
            elements,
            squeezes,
            keying.dropped_event_count(),
            audio_samples
        );
        keying.dump_engine_state(2_000_000);
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    if let Err(err) = demo::run() {
        eprintln!("demo failed: {err}");
        std::process::exit(1);
    }
}

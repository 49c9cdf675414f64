//! Device configuration.
//!
//! Single source of truth for pin assignments and runtime keying/audio
//! parameters. Plain structs with explicit defaults; persistence and the
//! parameter-registry surface live outside this core.
//!
//! Hardware fields (pins) require a reboot to change; keying and audio
//! fields are hot-reloadable through `KeyingSubsystem::apply_config` and the
//! sidetone setters.

use crate::keying::engine::IambicMode;

/// Preconfigured iambic behaviours V0..V9 plus fully manual.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyingPreset {
    SuperKeyerBoth = 0,
    SuperKeyerDot = 1,
    SuperKeyerDash = 2,
    AccukeyerBoth = 3,
    AccukeyerDot = 4,
    AccukeyerDash = 5,
    CurtisABoth = 6,
    CurtisADot = 7,
    CurtisADash = 8,
    NoMemory = 9,
    Manual = 255,
}

impl KeyingPreset {
    /// Index into the preset definition table, `None` for Manual.
    pub fn table_index(self) -> Option<usize> {
        match self {
            KeyingPreset::Manual => None,
            preset => Some(preset as usize),
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => KeyingPreset::SuperKeyerBoth,
            1 => KeyingPreset::SuperKeyerDot,
            2 => KeyingPreset::SuperKeyerDash,
            3 => KeyingPreset::AccukeyerBoth,
            4 => KeyingPreset::AccukeyerDot,
            5 => KeyingPreset::AccukeyerDash,
            6 => KeyingPreset::CurtisABoth,
            7 => KeyingPreset::CurtisADot,
            8 => KeyingPreset::CurtisADash,
            9 => KeyingPreset::NoMemory,
            _ => KeyingPreset::Manual,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            KeyingPreset::SuperKeyerBoth => "V0 SuperKeyer dot+dash",
            KeyingPreset::SuperKeyerDot => "V1 SuperKeyer dot",
            KeyingPreset::SuperKeyerDash => "V2 SuperKeyer dash",
            KeyingPreset::AccukeyerBoth => "V3 Accukeyer dot+dash",
            KeyingPreset::AccukeyerDot => "V4 Accukeyer dot",
            KeyingPreset::AccukeyerDash => "V5 Accukeyer dash",
            KeyingPreset::CurtisABoth => "V6 Curtis-A dot+dash",
            KeyingPreset::CurtisADot => "V7 Curtis-A dot",
            KeyingPreset::CurtisADash => "V8 Curtis-A dash",
            KeyingPreset::NoMemory => "V9 no memory",
            KeyingPreset::Manual => "manual",
        }
    }
}

/// Per-preset behaviour and timing definition.
///
/// The factory table seeds one of these per preset V0..V9; users may edit
/// them at runtime (per-preset L/S/P overrides). Manual mode bypasses the
/// table and uses the top-level [`KeyingConfig`] fields.
#[derive(Clone, Copy, Debug)]
pub struct PresetConfig {
    /// Window opens at this % of element duration
    pub memory_open_pct: f32,
    /// Window closes at this % of element duration
    pub memory_close_pct: f32,
    pub enable_dit_memory: bool,
    pub enable_dah_memory: bool,
    /// true = state latch (SuperKeyer/Accukeyer), false = edge (Curtis-A)
    pub use_state_latch: bool,
    pub iambic_mode: IambicMode,
    /// Dash length ratio, dash = (L/10) * dit
    pub timing_l: u8,
    /// Gap space ratio, gap = (S/50) * dit
    pub timing_s: u8,
    /// Dit duration percent, dit = theoretical * (P/50)
    pub timing_p: u8,
}

impl PresetConfig {
    const fn family(
        enable_dit_memory: bool,
        enable_dah_memory: bool,
        use_state_latch: bool,
        iambic_mode: IambicMode,
    ) -> Self {
        Self {
            memory_open_pct: 60.0,
            memory_close_pct: 99.0,
            enable_dit_memory,
            enable_dah_memory,
            use_state_latch,
            iambic_mode,
            timing_l: 30,
            timing_s: 50,
            timing_p: 50,
        }
    }
}

/// Factory preset table, indexed V0..V9.
pub const PRESET_DEFAULTS: [PresetConfig; 10] = [
    // V0-V2: SuperKeyer (state latch, Mode B)
    PresetConfig::family(true, true, true, IambicMode::B),
    PresetConfig::family(true, false, true, IambicMode::B),
    PresetConfig::family(false, true, true, IambicMode::B),
    // V3-V5: Accukeyer (state latch, Mode B)
    PresetConfig::family(true, true, true, IambicMode::B),
    PresetConfig::family(true, false, true, IambicMode::B),
    PresetConfig::family(false, true, true, IambicMode::B),
    // V6-V8: Curtis Mode A (edge trigger)
    PresetConfig::family(true, true, false, IambicMode::A),
    PresetConfig::family(true, false, false, IambicMode::A),
    PresetConfig::family(false, true, false, IambicMode::A),
    // V9: plain iambic, no memory
    PresetConfig::family(false, false, false, IambicMode::A),
];

/// Paddle input pin assignments.
#[derive(Clone, Copy, Debug)]
pub struct PaddlePins {
    pub dit_gpio: i32,
    pub dah_gpio: i32,
    /// Straight key input (optional, -1 = not configured)
    pub key_gpio: i32,
    pub paddles_active_low: bool,
    pub use_pullups: bool,
    pub use_pulldowns: bool,
}

impl Default for PaddlePins {
    fn default() -> Self {
        Self {
            dit_gpio: 3,
            dah_gpio: 4,
            key_gpio: -1,
            paddles_active_low: true,
            use_pullups: true,
            use_pulldowns: false,
        }
    }
}

/// Output pin assignments.
#[derive(Clone, Copy, Debug)]
pub struct OutputPins {
    /// Transmitter key output, driven by the keying subsystem
    pub trx_gpio: i32,
    /// true = HIGH when transmitting
    pub trx_active_high: bool,
}

impl Default for OutputPins {
    fn default() -> Self {
        Self {
            trx_gpio: 15,
            trx_active_high: true,
        }
    }
}

/// Sidetone audio parameters.
#[derive(Clone, Copy, Debug)]
pub struct AudioConfig {
    pub sidetone_frequency_hz: u16,
    pub sidetone_volume_percent: u8,
    pub sidetone_fade_in_ms: u16,
    pub sidetone_fade_out_ms: u16,
    pub sidetone_enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sidetone_frequency_hz: 600,
            sidetone_volume_percent: 50,
            sidetone_fade_in_ms: 8,
            sidetone_fade_out_ms: 8,
            sidetone_enabled: true,
        }
    }
}

/// Keying behaviour parameters.
#[derive(Clone, Copy, Debug)]
pub struct KeyingConfig {
    pub preset: KeyingPreset,
    pub speed_wpm: u32,
    /// Manual-mode memory window open %
    pub memory_open_percent: f32,
    /// Manual-mode memory window close %
    pub memory_close_percent: f32,
    pub manual_memory_enable_dit: bool,
    pub manual_memory_enable_dah: bool,
    pub manual_use_state_latch: bool,
    pub manual_iambic_mode: IambicMode,
    /// Swap dit and dah GPIO assignments (left-handed operators)
    pub swap_paddles: bool,
    /// Manual-mode L-S-P timing
    pub timing_l: u8,
    pub timing_s: u8,
    pub timing_p: u8,
    /// Per-preset customisation, indexed V0..V9. Manual does not use this.
    pub preset_definitions: [PresetConfig; 10],
}

impl Default for KeyingConfig {
    fn default() -> Self {
        Self {
            preset: KeyingPreset::AccukeyerBoth,
            speed_wpm: 20,
            memory_open_percent: 60.0,
            memory_close_percent: 99.0,
            manual_memory_enable_dit: true,
            manual_memory_enable_dah: true,
            manual_use_state_latch: true,
            manual_iambic_mode: IambicMode::B,
            swap_paddles: false,
            timing_l: 30,
            timing_s: 50,
            timing_p: 50,
            preset_definitions: PRESET_DEFAULTS,
        }
    }
}

/// Remote keying parameters visible to the core (tail timing only; the wire
/// protocol lives outside).
#[derive(Clone, Copy, Debug)]
pub struct RemoteConfig {
    /// Base PTT tail delay; measured link latency is added dynamically
    pub ptt_tail_ms: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { ptt_tail_ms: 200 }
    }
}

/// Root configuration aggregate.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceConfig {
    pub paddle_pins: PaddlePins,
    pub output_pins: OutputPins,
    pub audio: AudioConfig,
    pub keying: KeyingConfig,
    pub remote: RemoteConfig,
}

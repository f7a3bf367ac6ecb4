//! ICM-20689 register map and configuration constants
//!
//! Addresses are taken from the ICM-20689 register map (datasheet p36).

/// ICM-20689 register addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    SelfTestXGyro = 0x00,
    SelfTestYGyro = 0x01,
    SelfTestZGyro = 0x02,
    SelfTestXAccel = 0x0D,
    SelfTestYAccel = 0x0E,
    SelfTestZAccel = 0x0F,
    XgOffsUsrH = 0x13,
    XgOffsUsrL = 0x14,
    YgOffsUsrH = 0x15,
    YgOffsUsrL = 0x16,
    ZgOffsUsrH = 0x17,
    ZgOffsUsrL = 0x18,
    SmplrtDiv = 0x19,
    Config = 0x1A,
    GyroConfig = 0x1B,
    AccelConfig = 0x1C,
    AccelConfig2 = 0x1D,
    LpModeCfg = 0x1E,
    AccelWomThr = 0x1F,
    FifoEn = 0x23,
    FsyncInt = 0x36,
    IntPinCfg = 0x37,
    IntEnable = 0x38,
    DmpIntStatus = 0x39,
    IntStatus = 0x3A,
    AccelXoutH = 0x3B,
    AccelXoutL = 0x3C,
    AccelYoutH = 0x3D,
    AccelYoutL = 0x3E,
    AccelZoutH = 0x3F,
    AccelZoutL = 0x40,
    TempOutH = 0x41,
    TempOutL = 0x42,
    GyroXoutH = 0x43,
    GyroXoutL = 0x44,
    GyroYoutH = 0x45,
    GyroYoutL = 0x46,
    GyroZoutH = 0x47,
    GyroZoutL = 0x48,
    SignalPathReset = 0x68,
    AccelIntelCtrl = 0x69,
    UserCtrl = 0x6A,
    PwrMgmt1 = 0x6B,
    PwrMgmt2 = 0x6C,
    FifoCountH = 0x72,
    FifoCountL = 0x73,
    FifoRw = 0x74,
    WhoAmI = 0x75,
    XaOffsetH = 0x77,
    XaOffsetL = 0x78,
    YaOffsetH = 0x7A,
    YaOffsetL = 0x7B,
    ZaOffsetH = 0x7D,
    ZaOffsetL = 0x7E,
}

impl Register {
    /// Bus address of the register
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

/// Expected WHO_AM_I value for the ICM-20689
pub const WHO_AM_I_VALUE: u8 = 0x98;

/// Internal sample rate with the DLPF enabled (Hz)
pub const INTERNAL_SAMPLE_RATE_HZ: f64 = 1000.0;

/// DLPF_CFG=1 selects the 1 kHz internal rate
pub const CONFIG_DLPF_1KHZ: u8 = 0x01;

/// FIFO_EN register bits
pub mod fifo_en {
    pub const SLV0: u8 = 1 << 0;
    pub const SLV1: u8 = 1 << 1;
    pub const SLV2: u8 = 1 << 2;
    pub const ACCEL: u8 = 1 << 3;
    pub const GYRO_Z: u8 = 1 << 4;
    pub const GYRO_Y: u8 = 1 << 5;
    pub const GYRO_X: u8 = 1 << 6;
    pub const TEMP: u8 = 1 << 7;

    /// Accelerometer plus all three gyro axes (12 bytes per FIFO slot)
    pub const ACCEL_GYRO: u8 = ACCEL | GYRO_X | GYRO_Y | GYRO_Z;
}

/// USER_CTRL register bits
pub mod user_ctrl {
    pub const FIFO_RST: u8 = 1 << 2;
    pub const I2C_IF_DIS: u8 = 1 << 4;
    pub const FIFO_EN: u8 = 1 << 6;
}

/// INT_ENABLE register bits
pub mod int_enable {
    pub const DATA_RDY_EN: u8 = 1 << 0;
    pub const I2C_MST_INT_EN: u8 = 1 << 3;
    pub const FIFO_OFLOW_EN: u8 = 1 << 4;
}

/// INT_STATUS register bits
pub mod int_status {
    pub const DATA_RDY_INT: u8 = 1 << 0;
    pub const I2C_MST_INT: u8 = 1 << 3;
    pub const FIFO_OFLOW_INT: u8 = 1 << 4;
}

/// EXT_SYNC_SET field of CONFIG (FSYNC sampling location)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtSyncSet {
    Disabled = 0x0,
    TempOutL = 0x1,
    GyroXoutL = 0x2,
    GyroYoutL = 0x3,
    GyroZoutL = 0x4,
    AccelXoutL = 0x5,
    AccelYoutL = 0x6,
    AccelZoutL = 0x7,
}

/// Accelerometer full-scale range (AFS_SEL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelRange {
    #[default]
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    pub const ALL: [AccelRange; 4] = [AccelRange::G2, AccelRange::G4, AccelRange::G8, AccelRange::G16];

    /// LSB per g
    pub const fn sensitivity(self) -> f64 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }

    /// AFS_SEL selector value (0..=3)
    pub const fn selector(self) -> u8 {
        match self {
            AccelRange::G2 => 0,
            AccelRange::G4 => 1,
            AccelRange::G8 => 2,
            AccelRange::G16 => 3,
        }
    }

    pub const fn from_selector(sel: u8) -> Self {
        match sel & 0x3 {
            0 => AccelRange::G2,
            1 => AccelRange::G4,
            2 => AccelRange::G8,
            _ => AccelRange::G16,
        }
    }

    /// ACCEL_CONFIG value (selector in bits 4:3)
    pub const fn register_value(self) -> u8 {
        self.selector() << 3
    }

    pub const fn from_register_value(value: u8) -> Self {
        Self::from_selector(value >> 3)
    }

    /// Full-scale span in g
    pub const fn g(self) -> u16 {
        2 << self.selector()
    }

    /// Parse a span in g (2, 4, 8 or 16)
    pub fn from_g(g: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.g() == g)
    }
}

/// Gyroscope full-scale range (FS_SEL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GyroRange {
    #[default]
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

impl GyroRange {
    pub const ALL: [GyroRange; 4] = [
        GyroRange::Dps250,
        GyroRange::Dps500,
        GyroRange::Dps1000,
        GyroRange::Dps2000,
    ];

    /// LSB per °/s
    pub const fn sensitivity(self) -> f64 {
        match self {
            GyroRange::Dps250 => 131.0,
            GyroRange::Dps500 => 65.5,
            GyroRange::Dps1000 => 32.8,
            GyroRange::Dps2000 => 16.4,
        }
    }

    /// FS_SEL selector value (0..=3)
    pub const fn selector(self) -> u8 {
        match self {
            GyroRange::Dps250 => 0,
            GyroRange::Dps500 => 1,
            GyroRange::Dps1000 => 2,
            GyroRange::Dps2000 => 3,
        }
    }

    pub const fn from_selector(sel: u8) -> Self {
        match sel & 0x3 {
            0 => GyroRange::Dps250,
            1 => GyroRange::Dps500,
            2 => GyroRange::Dps1000,
            _ => GyroRange::Dps2000,
        }
    }

    /// GYRO_CONFIG value (selector in bits 4:3)
    pub const fn register_value(self) -> u8 {
        self.selector() << 3
    }

    pub const fn from_register_value(value: u8) -> Self {
        Self::from_selector(value >> 3)
    }

    /// Full-scale span in °/s
    pub const fn dps(self) -> u16 {
        250 << self.selector()
    }

    /// Parse a span in °/s (250, 500, 1000 or 2000)
    pub fn from_dps(dps: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.dps() == dps)
    }
}

use core::fmt;

/// An error type representing the secure element's erroneous conditions,
/// optionally tagged with the protocol step that produced it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Error {
    repr: Repr,
    step: Option<Step>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Repr {
    Device(Status),
    Simple(ErrorKind),
}

/// Coarse classification of an [`Error`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Policy bits or arguments were wrong. Detected before any command is sent.
    Precondition,
    /// Bus, timeout or framing failure reported by the datalink.
    Transport,
    /// The chip answered with a non-OK status byte.
    ChipRejected,
    /// The chip refused a zone lock because the checksum did not match.
    ChecksumMismatch,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            repr: Repr::Simple(kind),
            step: None,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Error {
        Error {
            repr: Repr::Device(status),
            step: None,
        }
    }
}

impl Error {
    /// Name the step that failed. An already named step is kept.
    pub fn at(mut self, step: Step) -> Self {
        self.step.get_or_insert(step);
        self
    }

    pub fn step(&self) -> Option<Step> {
        self.step
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self.repr {
            Repr::Simple(kind) => Some(kind),
            Repr::Device(_) => None,
        }
    }

    pub fn status(&self) -> Option<Status> {
        match self.repr {
            Repr::Device(status) => Some(status),
            Repr::Simple(_) => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.repr {
            Repr::Device(_) => ErrorClass::ChipRejected,
            Repr::Simple(kind) => kind.class(),
        }
    }

    /// Raw status byte for chip rejections, the kind's code otherwise.
    pub fn code(&self) -> u8 {
        match self.repr {
            Repr::Device(status) => status as u8,
            Repr::Simple(kind) => kind as u8,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(step) = self.step {
            write!(fmt, "{}: ", step.as_str())?;
        }
        match &self.repr {
            Repr::Device(status) => write!(fmt, "{}", status.as_str()),
            Repr::Simple(kind) => write!(fmt, "{}", kind.as_str()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// response status byte indicates CheckMac or Verify failure (status byte = 0x01)
    CheckmacVerifyFailed = 0x01,
    /// response status byte indicates parsing error (status byte = 0x03)
    Parse = 0x03,
    /// response status byte is Ecc fault (status byte = 0x05)
    Ecc = 0x05,
    /// response status byte is Self Test Error, chip in failure mode (status
    /// byte = 0x07)
    SelfTest = 0x07,
    /// chip was in a state where it could not execute the command, response
    /// status byte indicates command execution error (status byte = 0x0F)
    Execution = 0x0F,
    /// response status byte is unknown
    Unknown = 0xD5,
    /// response status byte indicates Device did not receive data properly
    /// (status byte = 0xFF)
    Crc = 0xFF,
}

impl Status {
    /// `None` for the success byte and the after-wake byte.
    pub fn from_u8(status: u8) -> Option<Self> {
        use Status::*;
        match status {
            0x00 | 0x11 => None,
            x if x == CheckmacVerifyFailed as u8 => CheckmacVerifyFailed.into(),
            x if x == Parse as u8 => Parse.into(),
            x if x == Ecc as u8 => Ecc.into(),
            x if x == SelfTest as u8 => SelfTest.into(),
            x if x == Execution as u8 => Execution.into(),
            x if x == Crc as u8 => Crc.into(),
            _ => Unknown.into(),
        }
    }

    fn as_str(&self) -> &'static str {
        use Status::*;
        match self {
            CheckmacVerifyFailed => "checkmac or verify failed",
            Crc => "bad crc found (command not properly received by device) or other comm error",
            Ecc => "computation error during ECC processing causing invalid results",
            Execution => "chip can't execute the command",
            Parse => "command received byte length, opcode or parameter was illegal",
            SelfTest => "chip is in self test failure mode",
            Unknown => "response contains unknown non-zero status byte",
        }
    }
}

/// A list of specific error causes. Each kind is converted into `Error` type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// SlotConfig.IsSecret is not set on the target slot
    NotSecret = 0xC0,
    /// SlotConfig.WriteConfig forbids PrivWrite on the target slot
    PrivWriteForbidden = 0xC1,
    /// KeyConfig.Private is not set where a private key is required
    NotPrivateKey = 0xC2,
    /// KeyConfig.Private is set where a public key is required
    NotPublicKey = 0xC3,
    /// Slot index is outside of the variant's data zone
    InvalidSlot = 0xC4,
    /// The variant has no such feature (e.g. ECC commands on an ATSHA204A)
    Unsupported = 0xC5,
    /// No nonce was loaded into the session before deriving TempKey
    NoNonce = 0xC6,
    /// No valid TempKey in the session
    NoTempKey = 0xC7,
    /// Zone contents do not have the length the variant requires
    InvalidLength = 0xC8,
    /// The chip refused to lock the zone with the supplied checksum
    ChecksumMismatch = 0xC9,
    /// Key material could not be decoded
    KeyDecode = 0xCA,
    /// Device did not respond to wake call as expected
    WakeFailed = 0xD0,
    /// bad argument (out of range, null pointer, etc.)
    BadParam = 0xE2,
    /// Crc error in data received from device
    RxCrcError = 0xE5,
    /// Timed out while waiting for response. Number of bytes received is > 0.
    RxFail = 0xE6,
    /// Supplied buffer is too small for data required
    SmallBuffer = 0xED,
    /// Communication with device failed. Same as in hardware dependent modules.
    CommFail = 0xF0,
    /// opcode is not supported by the device
    BadOpcode = 0xF2,
    /// Failed to write
    TxFail = 0xF7,
}

impl ErrorKind {
    fn class(&self) -> ErrorClass {
        use ErrorKind::*;
        match self {
            NotSecret | PrivWriteForbidden | NotPrivateKey | NotPublicKey | InvalidSlot
            | Unsupported | NoNonce | NoTempKey | InvalidLength | KeyDecode | BadParam
            | BadOpcode => ErrorClass::Precondition,
            ChecksumMismatch => ErrorClass::ChecksumMismatch,
            WakeFailed | RxCrcError | RxFail | SmallBuffer | CommFail | TxFail => {
                ErrorClass::Transport
            }
        }
    }

    fn as_str(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            NotSecret => "invalid config: SlotConfig.IsSecret = 0",
            PrivWriteForbidden => "invalid config: PrivWrite forbidden",
            NotPrivateKey => "not a private key",
            NotPublicKey => "not a public key",
            InvalidSlot => "invalid slot",
            Unsupported => "operation is not supported by this device variant",
            NoNonce => "no nonce loaded into the session",
            NoTempKey => "no valid TempKey in the session",
            InvalidLength => "zone contents have the wrong length",
            ChecksumMismatch => "zone lock refused, checksum mismatch",
            KeyDecode => "could not decode private key",
            WakeFailed => "device did not respond to wake call as expected",
            BadParam => "bad argument (out of range, null pointer, etc.)",
            RxCrcError => "crc error in data received from device",
            RxFail => "timed out while waiting for response",
            SmallBuffer => "supplied buffer is too small for data required",
            CommFail => "communication with device failed",
            BadOpcode => "opcode is not supported by the device",
            TxFail => "failed to write",
        }
    }
}

/// The command or phase an error is attributed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Wake,
    Idle,
    Revision,
    Serial,
    Random,
    ReadConfig,
    Nonce,
    GenDig,
    GenKey,
    Sign,
    State,
    Verify,
    PrivWrite,
    WriteConfig,
    WriteData,
    WriteOtp,
    LockStatus,
    LockConfig,
    LockData,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        use Step::*;
        match self {
            Wake => "wake",
            Idle => "idle",
            Revision => "device revision",
            Serial => "serial number",
            Random => "random",
            ReadConfig => "read config",
            Nonce => "nonce",
            GenDig => "generate digest",
            GenKey => "generate key digest",
            Sign => "sign",
            State => "device state",
            Verify => "verify",
            PrivWrite => "private key write",
            WriteConfig => "write config",
            WriteData => "write data",
            WriteOtp => "write otp",
            LockStatus => "lock status",
            LockConfig => "lock config",
            LockData => "lock data / otp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_is_named_once() {
        let error = Error::from(Status::Execution)
            .at(Step::Nonce)
            .at(Step::GenDig);
        assert_eq!(error.step(), Some(Step::Nonce));
        assert_eq!(error.class(), ErrorClass::ChipRejected);
        assert_eq!(error.code(), 0x0F);
    }

    #[test]
    fn status_bytes() {
        assert_eq!(Status::from_u8(0x00), None);
        assert_eq!(Status::from_u8(0x11), None);
        assert_eq!(Status::from_u8(0x01), Some(Status::CheckmacVerifyFailed));
        assert_eq!(Status::from_u8(0x42), Some(Status::Unknown));
    }

    #[test]
    fn classes() {
        assert_eq!(
            Error::from(ErrorKind::NotSecret).class(),
            ErrorClass::Precondition
        );
        assert_eq!(Error::from(ErrorKind::TxFail).class(), ErrorClass::Transport);
        assert_eq!(
            Error::from(ErrorKind::ChecksumMismatch).class(),
            ErrorClass::ChecksumMismatch
        );
    }
}

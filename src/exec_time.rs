use super::command::OpCode;
use super::memory::Variant;

// Maximum execution time in ms, indexed by [ATECC508A, ATSHA204A].
// `0` marks a command the variant does not implement.
const EXEC_TIME_GENDIG: [u32; 2] = [11, 43];
const EXEC_TIME_GENKEY: [u32; 2] = [115, 0];
const EXEC_TIME_INFO: [u32; 2] = [1, 2];
const EXEC_TIME_LOCK: [u32; 2] = [32, 24];
const EXEC_TIME_NONCE: [u32; 2] = [7, 60];
const EXEC_TIME_PRIVWRITE: [u32; 2] = [48, 0];
const EXEC_TIME_RANDOM: [u32; 2] = [23, 50];
const EXEC_TIME_READ: [u32; 2] = [1, 5];
const EXEC_TIME_SIGN: [u32; 2] = [60, 0];
const EXEC_TIME_VERIFY: [u32; 2] = [72, 0];
const EXEC_TIME_WRITE: [u32; 2] = [26, 42];

impl Variant {
    /// Get the maximum execution time for the given command, `None` when the
    /// variant has no such command.
    pub(crate) fn execution_time(&self, opcode: &OpCode) -> Option<u32> {
        use OpCode::*;
        let index = match self {
            Variant::Atecc508a => 0,
            Variant::Atsha204a => 1,
        };
        let time = match opcode {
            GenDig => EXEC_TIME_GENDIG[index],
            GenKey => EXEC_TIME_GENKEY[index],
            Info => EXEC_TIME_INFO[index],
            Lock => EXEC_TIME_LOCK[index],
            Nonce => EXEC_TIME_NONCE[index],
            PrivWrite => EXEC_TIME_PRIVWRITE[index],
            Random => EXEC_TIME_RANDOM[index],
            Read => EXEC_TIME_READ[index],
            Sign => EXEC_TIME_SIGN[index],
            Verify => EXEC_TIME_VERIFY[index],
            Write => EXEC_TIME_WRITE[index],
        };
        Some(time).filter(|time| *time > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecc_only_commands() {
        assert_eq!(Variant::Atecc508a.execution_time(&OpCode::Sign), Some(60));
        assert_eq!(Variant::Atsha204a.execution_time(&OpCode::Sign), None);
        assert_eq!(Variant::Atsha204a.execution_time(&OpCode::PrivWrite), None);
        assert_eq!(Variant::Atsha204a.execution_time(&OpCode::Nonce), Some(60));
    }
}

//! Opcodes of the standard IJVM instruction set

use super::ArgKind;

/// Mnemonics the assembler emits on its own (wide prefixes, `#print` expansion)
pub mod mnemonic {
    pub const WIDE: &str = "WIDE";
    pub const BIPUSH: &str = "BIPUSH";
    pub const OUT: &str = "OUT";
}

const NONE: &[ArgKind] = &[];

/// The built-in instruction set: opcode, mnemonic, argument kinds
pub const DEFAULT_OPERATIONS: &[(u8, &str, &[ArgKind])] = &[
    (0x00, "NOP", NONE),
    (0x10, "BIPUSH", &[ArgKind::Byte]),
    (0x13, "LDC_W", &[ArgKind::Constant]),
    (0x15, "ILOAD", &[ArgKind::Var]),
    (0x36, "ISTORE", &[ArgKind::Var]),
    (0x57, "POP", NONE),
    (0x59, "DUP", NONE),
    (0x5F, "SWAP", NONE),
    (0x60, "IADD", NONE),
    (0x64, "ISUB", NONE),
    (0x7E, "IAND", NONE),
    (0x84, "IINC", &[ArgKind::Var, ArgKind::Byte]),
    (0x99, "IFEQ", &[ArgKind::Label]),
    (0x9B, "IFLT", &[ArgKind::Label]),
    (0x9F, "IF_ICMPEQ", &[ArgKind::Label]),
    (0xA7, "GOTO", &[ArgKind::Label]),
    (0xAC, "IRETURN", NONE),
    (0xB0, "IOR", NONE),
    (0xB6, "INVOKEVIRTUAL", &[ArgKind::Method]),
    (0xC4, "WIDE", NONE),
    (0xFC, "IN", NONE),
    (0xFD, "OUT", NONE),
    (0xFE, "ERR", NONE),
    (0xFF, "HALT", NONE),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_table_is_unique() {
        let opcodes: HashSet<u8> = DEFAULT_OPERATIONS.iter().map(|(opcode, _, _)| *opcode).collect();
        let names: HashSet<&str> = DEFAULT_OPERATIONS.iter().map(|(_, name, _)| *name).collect();
        assert_eq!(opcodes.len(), DEFAULT_OPERATIONS.len());
        assert_eq!(names.len(), DEFAULT_OPERATIONS.len());
    }

    #[test]
    fn test_emitted_mnemonics_are_defined() {
        let find = |wanted: &str| DEFAULT_OPERATIONS.iter().find(|(_, name, _)| *name == wanted);
        assert_eq!(find(mnemonic::WIDE).map(|(opcode, _, _)| *opcode), Some(0xC4));
        assert_eq!(find(mnemonic::BIPUSH).map(|(_, _, args)| args.to_vec()), Some(vec![ArgKind::Byte]));
        assert_eq!(find(mnemonic::OUT).map(|(opcode, _, _)| *opcode), Some(0xFD));
    }

    #[test]
    fn test_control_flow_takes_labels() {
        for (_, name, args) in DEFAULT_OPERATIONS {
            if name.starts_with("IF") || *name == "GOTO" {
                assert_eq!(*args, &[ArgKind::Label][..], "{} should take a label", name);
            }
        }
    }
}

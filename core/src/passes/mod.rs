//! The four transformation passes consulted by the compiler and the code
//! generator.

pub mod constants;
pub mod garbage;
pub mod identifiers;
pub mod opcodes;

pub use constants::{Constant, ConstantEncryptor, EncryptionFlags, PoolEntry};
pub use garbage::GarbageInjector;
pub use identifiers::IdentifierObfuscator;
pub use opcodes::OpcodeMap;

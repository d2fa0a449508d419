use super::{read_bytes, Attribute, AttributeLike, Deserialize, Serialize};
use crate::jvm::{Error, InternalErrorKind};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io;

/// Class file constants pool
///
/// Unlike a pool that is only ever written, this one is also reconstructed from parsed class
/// files. New constants are always appended, so indices handed out stay valid. Lookups go through
/// an index keyed by the encoded form of the constant, where the first occurrence of any
/// duplicate entry wins. Since the index is rebuilt from the pool contents alone, two pools with
/// the same entries will intern new constants identically.
#[derive(Clone, Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
    index: HashMap<Vec<u8>, ConstantIndex>,
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub offset: u16,
}

impl From<ConstantPoolOverflow> for Error {
    fn from(_: ConstantPoolOverflow) -> Error {
        Error::internal(InternalErrorKind::ConstantPoolOverflow)
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            index: HashMap::new(),
        }
    }

    /// Wrap constants which have been read out of a class file
    pub fn from_constants(constants: OffsetVec<Constant>) -> ConstantsPool {
        let mut index = HashMap::new();
        for (offset, _, constant) in &constants {
            if let Some(key) = constant.key() {
                index.entry(key).or_insert(ConstantIndex(offset.0 as u16));
            }
        }
        ConstantsPool { constants, index }
    }

    /// Value of the `constant_pool_count` entry (one more than the largest index)
    pub fn len(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn get(&self, index: impl Into<ConstantIndex>) -> Option<&Constant> {
        self.constants.get_offset(Offset(index.into().0 as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Look up the string behind a `CONSTANT_Utf8_info`
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Option<&str> {
        match self.get(index)? {
            Constant::Utf8(string) => Some(string),
            _ => None,
        }
    }

    /// Look up the name behind a `CONSTANT_Class_info`
    pub fn class_name(&self, index: ClassConstantIndex) -> Option<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => None,
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.len();
        if offset.checked_add(constant.width() as u16).is_none() {
            return Err(ConstantPoolOverflow { offset });
        }
        self.constants.push(constant);
        Ok(ConstantIndex(offset))
    }

    /// Get or insert a constant
    pub fn intern(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let key = constant.key().ok_or(ConstantPoolOverflow { offset: self.len() })?;
        if let Some(idx) = self.index.get(&key) {
            return Ok(*idx);
        }
        let idx = self.push_constant(constant)?;
        self.index.insert(key, idx);
        Ok(idx)
    }

    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        self.intern(Constant::Utf8(utf8.to_owned()))
            .map(Utf8ConstantIndex)
    }

    /// Get or insert a class constant (array classes are named by their descriptor)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        self.intern(Constant::Class(name)).map(ClassConstantIndex)
    }

    pub fn get_string(&mut self, string: &str) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        let utf8 = self.get_utf8(string)?;
        self.intern(Constant::String(utf8)).map(StringConstantIndex)
    }

    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    pub fn get_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef(class, name_and_type))
            .map(FieldRefConstantIndex)
    }

    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
        .map(MethodRefConstantIndex)
    }

    /// Encode an attribute, registering its name in the pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let info = attribute
            .to_bytes()
            .map_err(|err| Error::internal(InternalErrorKind::CodeOverflow(err.to_string())))?;
        Ok(Attribute { name_index, info })
    }

    /// Find the name of an attribute
    pub fn attribute_name(&self, attribute: &Attribute) -> Option<&str> {
        self.utf8(attribute.name_index)
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.len().serialize(writer)?;
        for (_, constant) in self.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantsPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let count = u16::deserialize(reader)? as usize;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count {
            constants.push(Constant::deserialize(reader)?);
        }
        if constants.offset_len().0 != count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Wide constant overruns the constant pool",
            ));
        }
        Ok(ConstantsPool::from_constants(constants))
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle { kind: u8, member: ConstantIndex },

    /// Method type
    MethodType(Utf8ConstantIndex),

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),

    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Lookup key for the pool index (the encoded entry)
    fn key(&self) -> Option<Vec<u8>> {
        self.to_bytes().ok()
    }

    /// Entries which can be the operand of `ldc`/`ldc_w`/`ldc2_w`
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::String(_)
                | Constant::Class(_)
                | Constant::MethodHandle { .. }
                | Constant::MethodType(_)
                | Constant::Dynamic { .. }
        )
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                let len = u16::try_from(buffer.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "UTF-8 constant is too long")
                })?;
                len.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if *is_interface { 11u8 } else { 10u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle { kind, member } => {
                15u8.serialize(writer)?;
                kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType(descriptor) => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)? as usize;
                let bytes = read_bytes(reader, len)?;
                let string = decode_modified_utf8(&bytes)
                    .map_err(|msg| io::Error::new(io::ErrorKind::InvalidData, msg))?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                kind: u8::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType(Utf8ConstantIndex::deserialize(reader)?),
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Unknown constant pool tag {}", other),
                ))
            }
        };
        Ok(constant)
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`, which
/// also make the following index unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units) {
            let code = *unit;
            match code {
                0x0001..=0x007F => buffer.push(code as u8),
                0x0000 | 0x0080..=0x07FF => {
                    buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                    buffer.push((code & 0x3F) as u8 | 0b1000_0000);
                }
                _ => {
                    buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                    buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                    buffer.push((code & 0x3F) as u8 | 0b1000_0000);
                }
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Bytes are decoded into UTF-16 code units first, which takes care of re-pairing surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    let continuation = |byte: Option<u8>| -> Result<u16, String> {
        match byte {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            Some(b) => Err(format!("Invalid continuation byte {:#04x}", b)),
            None => Err(String::from("Truncated modified UTF-8 sequence")),
        }
    };
    while let Some(byte) = iter.next() {
        let unit = if byte & 0b1000_0000 == 0 {
            byte as u16
        } else if byte & 0b1110_0000 == 0b1100_0000 {
            ((byte & 0x1F) as u16) << 6 | continuation(iter.next())?
        } else if byte & 0b1111_0000 == 0b1110_0000 {
            let high = continuation(iter.next())?;
            let low = continuation(iter.next())?;
            ((byte & 0x0F) as u16) << 12 | high << 6 | low
        } else {
            return Err(format!("Invalid leading byte {:#04x}", byte));
        };
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|err| err.to_string())
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        u16::deserialize(reader).map(ConstantIndex)
    }
}

macro_rules! typed_constant_indices {
    ($($(#[$doc:meta])* $name:ident;)*) => {
        $(
            $(#[$doc])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $name {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
                    ConstantIndex::deserialize(reader).map($name)
                }
            }
        )*
    };
}

typed_constant_indices! {
    /// Index of a `CONSTANT_Utf8_info`
    Utf8ConstantIndex;
    /// Index of a `CONSTANT_String_info`
    StringConstantIndex;
    NameAndTypeConstantIndex;
    /// Index of a `CONSTANT_Class_info`
    ClassConstantIndex;
    FieldRefConstantIndex;
    /// Index of a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    MethodRefConstantIndex;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modified_utf8_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn modified_utf8_multibyte() {
        assert_eq!(encode_modified_utf8("Ą"), vec![196, 132]);
        assert_eq!(encode_modified_utf8("ऄ"), vec![224, 164, 132]);
        assert_eq!(decode_modified_utf8(&[224, 164, 132]).unwrap(), "ऄ");
    }

    #[test]
    fn modified_utf8_supplementary_characters() {
        let encoded = encode_modified_utf8("\u{10000}\u{10FFFF}");
        assert_eq!(
            encoded,
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "\u{10000}\u{10FFFF}");
    }

    #[test]
    fn modified_utf8_rejects_garbage() {
        assert!(decode_modified_utf8(&[0xFF]).is_err());
        assert!(decode_modified_utf8(&[0xC4]).is_err());
        assert!(decode_modified_utf8(&[237, 160, 128]).is_err());
    }

    #[test]
    fn interning_reuses_entries() {
        let mut pool = ConstantsPool::new();
        let first = pool
            .get_method_ref("java/util/List", "size", "()I", true)
            .unwrap();
        let len = pool.len();
        let second = pool
            .get_method_ref("java/util/List", "size", "()I", true)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.len(), len);
        assert_eq!(pool.get_class("java/util/List").unwrap().0, ConstantIndex(2));
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        assert_eq!(pool.intern(Constant::Long(7)).unwrap(), ConstantIndex(1));
        assert_eq!(pool.intern(Constant::Integer(7)).unwrap(), ConstantIndex(3));
        assert_eq!(pool.len(), 4);
        assert!(pool.get(ConstantIndex(2)).is_none());
    }

    #[test]
    fn reparsed_pool_interns_like_the_original() {
        let mut pool = ConstantsPool::new();
        pool.get_string("order").unwrap();
        pool.intern(Constant::Double(1.5)).unwrap();
        pool.get_class("com/example/Order").unwrap();

        let mut reparsed = ConstantsPool::from_bytes(&pool.to_bytes().unwrap()).unwrap();
        assert_eq!(reparsed.len(), pool.len());
        assert_eq!(
            reparsed.get_class("com/example/Order").unwrap(),
            pool.get_class("com/example/Order").unwrap()
        );
        assert_eq!(
            reparsed.get_utf8("item").unwrap(),
            pool.get_utf8("item").unwrap()
        );
    }
}

use super::{
    Attribute, ClassConstantIndex, ConstantIndex, ConstantsPool, Deserialize, Field, Method,
    Serialize, Version,
};
use crate::jvm::ClassAccessFlags;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::{Error, ErrorKind, Result};
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file, rejecting trailing garbage
    pub fn parse(mut bytes: &[u8]) -> Result<ClassFile> {
        let class_file = ClassFile::deserialize(&mut bytes)?;
        if !bytes.is_empty() {
            let msg = format!("{} trailing bytes after class file", bytes.len());
            return Err(Error::new(ErrorKind::InvalidData, msg));
        }
        Ok(class_file)
    }

    /// Name of the class, as recorded in its own constant pool
    pub fn class_name(&self) -> Option<&str> {
        self.constants.class_name(self.this_class)
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_bytes()?)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => ConstantIndex(0).serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::new(ErrorKind::InvalidData, "Missing 0xCAFEBABE header"));
        }
        let version = Version::deserialize(reader)?;
        let constants = ConstantsPool::deserialize(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = match ClassConstantIndex::deserialize(reader)? {
            ClassConstantIndex(ConstantIndex(0)) => None,
            idx => Some(idx),
        };
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn point_class() -> ClassFile {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class("me/alec/Point").unwrap();
        let super_class = constants.get_class("java/lang/Object").unwrap();
        let field = Field {
            access_flags: crate::jvm::FieldAccessFlags::PUBLIC,
            name_index: constants.get_utf8("x").unwrap(),
            descriptor_index: constants.get_utf8("I").unwrap(),
            attributes: vec![],
        };
        ClassFile {
            version: Version::JAVA5,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![field],
            methods: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn parse_written_class() {
        let bytes = point_class().to_bytes().unwrap();
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.class_name(), Some("me/alec/Point"));
        assert_eq!(parsed.version, Version::JAVA5);
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.constants.utf8(parsed.fields[0].name_index), Some("x"));
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn reject_bad_input() {
        assert!(ClassFile::parse(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 49]).is_err());

        let mut bytes = point_class().to_bytes().unwrap();
        bytes.push(0);
        assert!(ClassFile::parse(&bytes).is_err());
        assert!(ClassFile::parse(&bytes[..20]).is_err());
    }
}

use crate::jvm::class_file::{AttributeLike, ClassFile, Code, Serialize};
use crate::jvm::code::check_code;
use crate::jvm::{BinaryName, Error, InternalErrorKind, Name};
use crate::session::Session;

impl Session {
    /// Serialize each class, read it back, and check the structure of every method body
    ///
    /// This doesn't type check anything (the assembler already did that), but it catches
    /// encoding problems before they land on disk.
    pub fn verify_classes(&self, names: &[BinaryName]) -> Result<(), Error> {
        for name in names {
            let class = self.registry().require_class(name.as_str())?;
            let format_error = |err: std::io::Error| Error::ClassFormat {
                class: name.as_str().to_owned(),
                message: err.to_string(),
            };

            let bytes = class.to_class_file()?.to_bytes().map_err(format_error)?;
            let parsed = ClassFile::parse(&bytes).map_err(format_error)?;
            if parsed.class_name() != Some(name.as_str()) {
                return Err(Error::ClassFormat {
                    class: name.as_str().to_owned(),
                    message: String::from("class name changed when written out"),
                });
            }

            for method in &parsed.methods {
                let method_name = parsed.constants.utf8(method.name_index).unwrap_or("?");
                let method_descriptor = parsed.constants.utf8(method.descriptor_index).unwrap_or("");
                for attribute in &method.attributes {
                    if parsed.constants.attribute_name(attribute) != Some(Code::NAME) {
                        continue;
                    }
                    let code = attribute.decode::<Code>().map_err(format_error)?;
                    check_code(&code.code_array, &parsed.constants).map_err(|err| {
                        Error::internal(InternalErrorKind::InvalidCode(err.to_string())).in_method(
                            name.as_str(),
                            &format!("{}{}", method_name, method_descriptor),
                        )
                    })?;
                }
            }
            log::trace!("Verified {} ({} bytes)", name, bytes.len());
        }
        Ok(())
    }
}

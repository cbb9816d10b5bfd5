use std::borrow::Cow;
use std::fmt;

/// Name of a class or interface, in internal (slash-separated) form
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Name of a field or method
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Characters that may not appear in an unqualified name
fn find_illegal_char(segment: &str) -> Option<char> {
    segment.chars().find(|c| matches!(c, '.' | ';' | '[' | '/'))
}

impl UnqualifiedName {
    /// Validate and wrap a field or method name
    pub fn from_string(name: String) -> Result<UnqualifiedName, String> {
        if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else if let Some(c) = find_illegal_char(&name) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character '{}'",
                name, c,
            ))
        } else {
            Ok(UnqualifiedName(Cow::Owned(name)))
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");
}

impl BinaryName {
    /// Validate and wrap an internal class name
    ///
    /// Every slash-separated segment must itself be a valid unqualified name
    /// (so dotted names like `java.lang.String` are rejected here).
    pub fn from_string(name: String) -> Result<BinaryName, String> {
        for segment in name.split('/') {
            if segment.is_empty() {
                return Err(format!("Binary name '{}' has an empty segment", name));
            } else if let Some(c) = find_illegal_char(segment) {
                return Err(format!(
                    "Binary name '{}' contains an illegal character '{}'",
                    name, c,
                ));
            }
        }
        Ok(BinaryName(Cow::Owned(name)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // JDK names the constant-loading type rules reach for
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const STRING: Self = Self::name("java/lang/String");
}

impl fmt::Debug for UnqualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

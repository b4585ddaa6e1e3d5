/// Generates impls for opaque string identifiers.
///
/// This must be a newtype a la `struct Foo(String);`.
#[macro_export]
macro_rules! impl_string_id {
    ($target:ident) => {
        impl $target {
            pub fn new(v: impl ::std::convert::Into<String>) -> Self {
                Self(v.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::std::convert::From<String> for $target {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl ::std::convert::From<&str> for $target {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl ::std::convert::From<$target> for String {
            fn from(value: $target) -> Self {
                value.0
            }
        }

        impl ::std::convert::AsRef<str> for $target {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl ::std::borrow::Borrow<str> for $target {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $target {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::std::fmt::Debug for $target {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                // Signatures are long hex strings, only show a prefix.
                let s = &self.0;
                match s.char_indices().nth(16) {
                    Some((idx, _)) => write!(f, "{}({}..)", stringify!($target), &s[..idx]),
                    None => write!(f, "{}({})", stringify!($target), s),
                }
            }
        }
    };
}

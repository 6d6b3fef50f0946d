use std::fmt;
use std::ops::Deref;
use std::str::from_utf8_unchecked;

use crate::protocol::TypeId;

pub use self::signature_error::SignatureError;
mod signature_error;

use self::validation::validate;
mod validation;


/// Maximum number of bytes in a signature.
///
/// The thin client caps signatures well below the 255-byte D-Bus limit.
pub(crate) const MAX_SIGNATURE: usize = 64;

/// Maximum number of nested arrays or structs.
pub(crate) const MAX_CONTAINER_DEPTH: usize = 8;

/// Maximum total nesting depth tracked during validation.
pub(crate) const MAX_DEPTH: usize = 16;

/// A validated type signature.
///
/// # Examples
///
/// ```
/// use alljoyn_thin::Signature;
///
/// const SIG: &Signature = Signature::new_const(b"a{us}");
///
/// assert!(Signature::new(b"u(usu(ii)qsq)yyy").is_ok());
/// assert!(Signature::new(b"a").is_err());
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_const(b"");

    /// A single string.
    pub const STRING: &'static Signature = Signature::new_const(b"s");

    /// A single object path.
    pub const OBJECT_PATH: &'static Signature = Signature::new_const(b"o");

    /// A single unsigned 32-bit integer.
    pub const UINT32: &'static Signature = Signature::new_const(b"u");

    /// Construct a new signature with validation inside of a constant
    /// context, panicking if the signature is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use alljoyn_thin::Signature;
    ///
    /// const SIG: &Signature = Signature::new_const(b"a(usay)");
    /// ```
    #[track_caller]
    pub const fn new_const(bytes: &[u8]) -> &Signature {
        if validate(bytes).is_err() {
            panic!("invalid signature");
        }

        // SAFETY: The signature was just validated.
        unsafe { Self::new_unchecked(bytes) }
    }

    /// Construct and validate a signature.
    pub fn new(bytes: &[u8]) -> Result<&Signature, SignatureError> {
        validate(bytes)?;
        // SAFETY: The signature was just validated.
        Ok(unsafe { Self::new_unchecked(bytes) })
    }

    /// Construct a signature without validation.
    ///
    /// # Safety
    ///
    /// `bytes` must be a valid signature.
    pub(crate) const unsafe fn new_unchecked(bytes: &[u8]) -> &Signature {
        &*(bytes as *const [u8] as *const Signature)
    }

    /// Get the signature as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation only accepts ASCII type codes.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the signature as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Test if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of bytes in the signature.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:?})", self.as_str())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<Signature> for Signature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl PartialEq<str> for Signature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<Signature> for str {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        self == other.as_str()
    }
}

impl ToOwned for Signature {
    type Owned = SignatureBuf;

    #[inline]
    fn to_owned(&self) -> SignatureBuf {
        SignatureBuf::from_signature(self)
    }
}

/// A small owned signature with a fixed capacity of [`MAX_SIGNATURE`] bytes.
///
/// Dereferences to [`Signature`].
#[derive(Clone, Copy)]
pub struct SignatureBuf {
    data: [u8; MAX_SIGNATURE],
    len: usize,
}

impl SignatureBuf {
    /// Construct a new empty signature buffer.
    pub const fn empty() -> Self {
        Self {
            data: [0; MAX_SIGNATURE],
            len: 0,
        }
    }

    pub(crate) fn from_signature(signature: &Signature) -> Self {
        let mut this = Self::empty();
        // Signatures are validated, so they always fit.
        let _ = this.try_extend(signature.as_bytes());
        this
    }

    /// Append raw bytes, returning `false` when the capacity is exceeded.
    ///
    /// The contents are only a valid signature once the full sequence has
    /// been pushed and validated by the caller.
    #[must_use = "Return value must be observed to detect overflow"]
    pub(crate) fn try_extend(&mut self, bytes: &[u8]) -> bool {
        if self.len + bytes.len() > MAX_SIGNATURE {
            return false;
        }

        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }

    /// Append a single byte, returning `false` when the capacity is exceeded.
    #[must_use = "Return value must be observed to detect overflow"]
    pub(crate) fn try_push(&mut self, byte: u8) -> bool {
        if self.len == MAX_SIGNATURE {
            return false;
        }

        self.data[self.len] = byte;
        self.len += 1;
        true
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}

impl Deref for SignatureBuf {
    type Target = Signature;

    #[inline]
    fn deref(&self) -> &Signature {
        // SAFETY: Construction sites only produce validated contents.
        unsafe { Signature::new_unchecked(&self.data[..self.len]) }
    }
}

impl AsRef<Signature> for SignatureBuf {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl std::borrow::Borrow<Signature> for SignatureBuf {
    #[inline]
    fn borrow(&self) -> &Signature {
        self
    }
}

impl fmt::Debug for SignatureBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl fmt::Display for SignatureBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl PartialEq for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for SignatureBuf {}

impl PartialEq<Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        **self == *other
    }
}

impl From<&Signature> for SignatureBuf {
    #[inline]
    fn from(signature: &Signature) -> Self {
        Self::from_signature(signature)
    }
}

/// Find the end of the next complete type starting at `pos` in a valid
/// signature, or `None` if `pos` is at the end.
pub(crate) fn complete_type_end(bytes: &[u8], pos: usize) -> Option<usize> {
    let mut n = pos;
    let mut depth = 0usize;

    loop {
        let b = *bytes.get(n)?;
        n += 1;

        let (c, term) = match TypeId(b) {
            TypeId::ARRAY => (0isize, false),
            TypeId::OPEN_PAREN | TypeId::OPEN_BRACE => (1, false),
            TypeId::CLOSE_PAREN | TypeId::CLOSE_BRACE => (-1, true),
            _ => (0, true),
        };

        depth = depth.wrapping_add_signed(c);

        if term && depth == 0 {
            return Some(n);
        }
    }
}

//! Signature-cursor tracking for an open message.
//!
//! One walker exists per open message and direction. The cursor advances
//! through the declared body signature as values are produced or consumed;
//! containers push a frame so the cursor can wrap per array element and
//! resume after a close. Variants splice their announced signature in and
//! pop automatically once it is exhausted.

use crate::arg::ContainerKind;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::TypeId;
use crate::signature::{complete_type_end, MAX_CONTAINER_DEPTH};
use crate::{Signature, SignatureBuf};

#[derive(Clone)]
enum WalkFrame {
    Struct,
    Dict,
    Array {
        /// Cursor bounds of the element type.
        elem_start: usize,
        elem_end: usize,
        /// Direction-specific byte offsets: the length-patch position and
        /// data start while marshaling, unused and the absolute data end
        /// while unmarshaling.
        mark: usize,
        data: usize,
    },
    Variant {
        saved_sig: SignatureBuf,
        saved_pos: usize,
    },
}

impl WalkFrame {
    fn kind(&self) -> ContainerKind {
        match self {
            WalkFrame::Struct => ContainerKind::Struct,
            WalkFrame::Dict => ContainerKind::DictEntry,
            // Variants have no user-facing close; they never collide with a
            // container token in practice.
            WalkFrame::Array { .. } | WalkFrame::Variant { .. } => ContainerKind::Array,
        }
    }
}

#[derive(Clone)]
pub(super) struct SigWalker {
    sig: SignatureBuf,
    pos: usize,
    frames: Vec<WalkFrame>,
}

impl SigWalker {
    pub(super) fn new(sig: &Signature) -> Self {
        Self {
            sig: SignatureBuf::from_signature(sig),
            pos: 0,
            frames: Vec::new(),
        }
    }

    /// Current container nesting depth.
    pub(super) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Test if every declared value has been walked and every container
    /// closed.
    pub(super) fn finished(&self) -> bool {
        self.frames.is_empty() && self.pos == self.sig.len()
    }

    /// The kind of the innermost open container, if any.
    pub(super) fn top_kind(&self) -> Option<ContainerKind> {
        Some(self.frames.last()?.kind())
    }

    /// The recorded data offset of the innermost frame when it is an array.
    pub(super) fn top_array_data(&self) -> Option<usize> {
        match self.frames.last() {
            Some(WalkFrame::Array { data, .. }) => Some(*data),
            _ => None,
        }
    }

    /// Wrap the cursor back to the element start when a full array element
    /// has been walked.
    fn wrap(&mut self) {
        if let Some(WalkFrame::Array {
            elem_start,
            elem_end,
            ..
        }) = self.frames.last()
        {
            if self.pos == *elem_end {
                self.pos = *elem_start;
            }
        }
    }

    /// Pop variant frames whose announced signature has been exhausted.
    fn settle(&mut self) {
        while self.pos == self.sig.len() {
            match self.frames.last() {
                Some(WalkFrame::Variant { saved_sig, saved_pos }) => {
                    self.sig = *saved_sig;
                    self.pos = *saved_pos;
                    self.frames.pop();
                }
                _ => break,
            }
        }
    }

    /// The type code the cursor points at, or `None` at the end of the
    /// signature.
    pub(super) fn peek(&mut self) -> Option<TypeId> {
        self.wrap();
        self.sig.as_bytes().get(self.pos).copied().map(TypeId)
    }

    /// The element type of the array the cursor points at.
    pub(super) fn array_elem(&mut self) -> Result<TypeId> {
        self.wrap();
        let bytes = self.sig.as_bytes();

        if bytes.get(self.pos) != Some(&TypeId::ARRAY.0) {
            return Err(Error::new(ErrorKind::SignatureMismatch));
        }

        match bytes.get(self.pos + 1) {
            Some(&b) => Ok(TypeId(b)),
            None => Err(Error::new(ErrorKind::SignatureMismatch)),
        }
    }

    fn expect(&mut self, code: u8) -> Result<()> {
        if self.sig.as_bytes().get(self.pos) != Some(&code) {
            return Err(Error::new(ErrorKind::SignatureMismatch));
        }

        self.pos += 1;
        Ok(())
    }

    fn push(&mut self, frame: WalkFrame) -> Result<()> {
        if self.frames.len() == MAX_CONTAINER_DEPTH {
            return Err(Error::new(ErrorKind::Resources));
        }

        self.frames.push(frame);
        Ok(())
    }

    /// Walk one basic value of the given type.
    pub(super) fn basic(&mut self, tid: TypeId) -> Result<()> {
        self.wrap();
        self.expect(tid.0)?;
        self.settle();
        Ok(())
    }

    /// Walk a whole `ay` byte array.
    pub(super) fn byte_array(&mut self) -> Result<()> {
        self.wrap();
        self.expect(TypeId::ARRAY.0)?;
        self.expect(TypeId::BYTE.0)?;
        self.settle();
        Ok(())
    }

    pub(super) fn open_struct(&mut self) -> Result<()> {
        self.wrap();
        self.expect(TypeId::OPEN_PAREN.0)?;
        self.push(WalkFrame::Struct)
    }

    pub(super) fn open_dict(&mut self) -> Result<()> {
        self.wrap();
        self.expect(TypeId::OPEN_BRACE.0)?;
        self.push(WalkFrame::Dict)
    }

    /// Open an array, recording the direction-specific offsets for its
    /// close.
    pub(super) fn open_array(&mut self, mark: usize, data: usize) -> Result<()> {
        self.wrap();
        self.expect(TypeId::ARRAY.0)?;

        let elem_start = self.pos;

        let Some(elem_end) = complete_type_end(self.sig.as_bytes(), elem_start) else {
            return Err(Error::new(ErrorKind::SignatureMismatch));
        };

        self.push(WalkFrame::Array {
            elem_start,
            elem_end,
            mark,
            data,
        })?;

        self.pos = elem_start;
        Ok(())
    }

    /// Splice in the announced signature of a variant value.
    pub(super) fn open_variant(&mut self, sig: &Signature) -> Result<()> {
        self.wrap();
        self.expect(TypeId::VARIANT.0)?;

        let frame = WalkFrame::Variant {
            saved_sig: self.sig,
            saved_pos: self.pos,
        };

        self.push(frame)?;
        self.sig = SignatureBuf::from_signature(sig);
        self.pos = 0;
        self.settle();
        Ok(())
    }

    pub(super) fn close_struct(&mut self) -> Result<()> {
        match self.frames.last() {
            Some(WalkFrame::Struct) => {}
            _ => return Err(Error::new(ErrorKind::Unexpected)),
        }

        // Closing with fields still expected is a signature violation.
        self.expect(TypeId::CLOSE_PAREN.0)?;
        self.frames.pop();
        self.settle();
        Ok(())
    }

    pub(super) fn close_dict(&mut self) -> Result<()> {
        match self.frames.last() {
            Some(WalkFrame::Dict) => {}
            _ => return Err(Error::new(ErrorKind::Unexpected)),
        }

        self.expect(TypeId::CLOSE_BRACE.0)?;
        self.frames.pop();
        self.settle();
        Ok(())
    }

    /// Close the innermost array, returning its recorded offsets.
    ///
    /// The cursor must sit at an element boundary; a close in the middle of
    /// an element would desynchronize the wire state.
    pub(super) fn close_array(&mut self) -> Result<(usize, usize)> {
        let (elem_start, elem_end, mark, data) = match self.frames.last() {
            Some(WalkFrame::Array {
                elem_start,
                elem_end,
                mark,
                data,
            }) => (*elem_start, *elem_end, *mark, *data),
            _ => return Err(Error::new(ErrorKind::Unexpected)),
        };

        if self.pos != elem_start && self.pos != elem_end {
            return Err(Error::new(ErrorKind::SignatureMismatch));
        }

        self.frames.pop();
        self.pos = elem_end;
        self.settle();
        Ok((mark, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(s: &str) -> &Signature {
        Signature::new(s.as_bytes()).unwrap()
    }

    #[test]
    fn flat_walk() {
        let mut w = SigWalker::new(sig("uqay"));
        assert!(!w.finished());

        w.basic(TypeId::UINT32).unwrap();
        w.basic(TypeId::UINT16).unwrap();
        w.byte_array().unwrap();
        assert!(w.finished());

        assert!(w.basic(TypeId::BYTE).unwrap_err().is_signature_mismatch());
    }

    #[test]
    fn type_mismatch() {
        let mut w = SigWalker::new(sig("u"));
        assert!(w.basic(TypeId::STRING).unwrap_err().is_signature_mismatch());
    }

    #[test]
    fn struct_walk() {
        let mut w = SigWalker::new(sig("u(usu(ii)qsq)yyy"));

        w.basic(TypeId::UINT32).unwrap();
        w.open_struct().unwrap();
        w.basic(TypeId::UINT32).unwrap();
        w.basic(TypeId::STRING).unwrap();
        w.basic(TypeId::UINT32).unwrap();
        w.open_struct().unwrap();
        w.basic(TypeId::INT32).unwrap();
        w.basic(TypeId::INT32).unwrap();
        w.close_struct().unwrap();
        w.basic(TypeId::UINT16).unwrap();
        w.basic(TypeId::STRING).unwrap();
        w.basic(TypeId::UINT16).unwrap();
        w.close_struct().unwrap();
        w.basic(TypeId::BYTE).unwrap();
        w.basic(TypeId::BYTE).unwrap();
        w.basic(TypeId::BYTE).unwrap();
        assert!(w.finished());
    }

    #[test]
    fn early_struct_close() {
        let mut w = SigWalker::new(sig("(iu)"));
        w.open_struct().unwrap();
        w.basic(TypeId::INT32).unwrap();
        assert!(w.close_struct().unwrap_err().is_signature_mismatch());
    }

    #[test]
    fn array_wraps_per_element() {
        let mut w = SigWalker::new(sig("a{us}"));

        w.open_array(0, 0).unwrap();

        for _ in 0..3 {
            w.open_dict().unwrap();
            w.basic(TypeId::UINT32).unwrap();
            w.basic(TypeId::STRING).unwrap();
            w.close_dict().unwrap();
        }

        w.close_array().unwrap();
        assert!(w.finished());
    }

    #[test]
    fn empty_array() {
        let mut w = SigWalker::new(sig("asu"));
        w.open_array(0, 0).unwrap();
        w.close_array().unwrap();
        w.basic(TypeId::UINT32).unwrap();
        assert!(w.finished());
    }

    #[test]
    fn nested_arrays() {
        let mut w = SigWalker::new(sig("aas"));

        w.open_array(0, 0).unwrap();

        for _ in 0..2 {
            w.open_array(0, 0).unwrap();
            w.basic(TypeId::STRING).unwrap();
            w.basic(TypeId::STRING).unwrap();
            w.close_array().unwrap();
        }

        w.close_array().unwrap();
        assert!(w.finished());
    }

    #[test]
    fn variant_pops_when_exhausted() {
        let mut w = SigWalker::new(sig("ivi"));

        w.basic(TypeId::INT32).unwrap();
        w.open_variant(sig("s")).unwrap();
        w.basic(TypeId::STRING).unwrap();
        // The variant is gone; the cursor is back on the outer signature.
        w.basic(TypeId::INT32).unwrap();
        assert!(w.finished());
    }

    #[test]
    fn variant_with_container() {
        let mut w = SigWalker::new(sig("v"));

        w.open_variant(sig("(iu)")).unwrap();
        w.open_struct().unwrap();
        w.basic(TypeId::INT32).unwrap();
        w.basic(TypeId::UINT32).unwrap();
        w.close_struct().unwrap();
        assert!(w.finished());
    }

    #[test]
    fn sequential_variants() {
        let mut w = SigWalker::new(sig("(vvvv)"));

        w.open_struct().unwrap();

        for _ in 0..4 {
            w.open_variant(sig("y")).unwrap();
            w.basic(TypeId::BYTE).unwrap();
        }

        w.close_struct().unwrap();
        assert!(w.finished());
    }

    #[test]
    fn depth_limit() {
        let mut w = SigWalker::new(sig("v"));

        for _ in 0..MAX_CONTAINER_DEPTH {
            w.open_variant(sig("v")).unwrap();
        }

        let err = w.open_variant(sig("y")).unwrap_err();
        assert!(err.is_resources());
    }

    #[test]
    fn unbalanced_close() {
        let mut w = SigWalker::new(sig("a{us}"));
        w.open_array(0, 0).unwrap();
        w.open_dict().unwrap();
        assert!(w.close_array().is_err());
    }
}

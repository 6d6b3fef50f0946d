use crate::protocol::TypeId;
use crate::stack::{Stack, StackValue};

use super::{SignatureError, MAX_CONTAINER_DEPTH, MAX_DEPTH, MAX_SIGNATURE};

#[derive(Default, Debug, Clone, Copy)]
#[repr(u8)]
pub(super) enum Kind {
    #[default]
    None,
    Array,
    Struct,
    Dict,
}

impl StackValue for (Kind, u8) {
    const DEFAULT: Self = (Kind::None, 0);
}

#[allow(unused_assignments)]
pub(super) const fn validate(bytes: &[u8]) -> Result<(), SignatureError> {
    use SignatureError::*;

    if bytes.len() > MAX_SIGNATURE {
        return Err(SignatureTooLong);
    }

    let mut stack = Stack::<(Kind, u8), MAX_DEPTH>::new();
    let mut arrays = 0;
    let mut structs = 0;
    let mut n = 0;

    while n < bytes.len() {
        let b = bytes[n];
        n += 1;
        let t = TypeId(b);

        let mut is_basic = match t {
            TypeId::BYTE => true,
            TypeId::BOOLEAN => true,
            TypeId::INT16 => true,
            TypeId::UINT16 => true,
            TypeId::INT32 => true,
            TypeId::UINT32 => true,
            TypeId::INT64 => true,
            TypeId::UINT64 => true,
            TypeId::DOUBLE => true,
            TypeId::STRING => true,
            TypeId::OBJECT_PATH => true,
            TypeId::SIGNATURE => true,
            TypeId::VARIANT => true,
            TypeId::HANDLE => true,
            TypeId::ARRAY => {
                if !stack_try_push!(stack, (Kind::Array, 0)) || arrays == MAX_CONTAINER_DEPTH {
                    return Err(ExceededMaximumArrayRecursion);
                }

                arrays += 1;
                continue;
            }
            TypeId::OPEN_PAREN => {
                if !stack_try_push!(stack, (Kind::Struct, 0)) || structs == MAX_CONTAINER_DEPTH {
                    return Err(ExceededMaximumStructRecursion);
                }

                structs += 1;
                continue;
            }
            TypeId::CLOSE_PAREN => {
                let fields = match stack_pop!(stack, (Kind, u8)) {
                    Some((Kind::Struct, fields)) => fields,
                    Some((Kind::Array, _)) => return Err(MissingArrayElementType),
                    _ => return Err(StructEndedButNotStarted),
                };

                if fields == 0 {
                    return Err(StructHasNoFields);
                }

                structs -= 1;
                false
            }
            TypeId::OPEN_BRACE => {
                if !stack_try_push!(stack, (Kind::Dict, 0)) {
                    return Err(ExceededMaximumDictRecursion);
                }

                continue;
            }
            TypeId::CLOSE_BRACE => {
                let fields = match stack_pop!(stack, (Kind, u8)) {
                    Some((Kind::Dict, fields)) => fields,
                    Some((Kind::Array, _)) => return Err(MissingArrayElementType),
                    _ => return Err(DictEndedButNotStarted),
                };

                match fields {
                    0 => return Err(DictEntryHasNoFields),
                    1 => return Err(DictEntryHasOnlyOneField),
                    2 => {}
                    _ => return Err(DictEntryHasTooManyFields),
                }

                if !matches!(stack_peek!(stack), Some((Kind::Array, _))) {
                    return Err(DictEntryNotInsideArray);
                }

                false
            }
            TypeId(code) => return Err(UnknownTypeCode(code)),
        };

        while let Some((Kind::Array, _)) = stack_peek!(stack) {
            stack_pop!(stack, (Kind, u8));
            is_basic = false;
        }

        if let Some((Kind::Dict, 0)) = stack_peek!(stack) {
            if !is_basic {
                return Err(DictKeyMustBeBasicType);
            }
        }

        if let Some((kind, fields)) = stack_pop!(stack, (Kind, u8)) {
            stack_try_push!(stack, (kind, fields + 1));
        }
    }

    match stack_pop!(stack, (Kind, u8)) {
        Some((Kind::Array, _)) => Err(MissingArrayElementType),
        Some((Kind::Struct, _)) => Err(StructStartedButNotEnded),
        Some((Kind::Dict, _)) => Err(DictStartedButNotEnded),
        _ => Ok(()),
    }
}

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::hash::hash_all;
use crate::view::View;

/// An immutable byte sequence.
#[derive(Clone)]
pub struct Binary {
    repr: Repr,
    hash: u32,
}

#[derive(Clone)]
enum Repr {
    Owned(Arc<[u8]>),
    Mapped(View),
}

impl Binary {
    pub fn new(bytes: Vec<u8>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        let hash = hash_all(bytes.iter().map(|b| *b as u32));
        Binary {
            repr: Repr::Owned(bytes),
            hash,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn mapped(view: View) -> Self {
        let hash = view.hash;
        Binary {
            repr: Repr::Mapped(view),
            hash,
        }
    }

    pub(crate) fn view(&self) -> Option<&View> {
        match &self.repr {
            Repr::Mapped(view) => Some(view),
            Repr::Owned(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Owned(bytes) => bytes.len(),
            Repr::Mapped(view) => view.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hash_code(&self) -> u32 {
        self.hash
    }

    pub fn get(&self, index: usize) -> Result<u8> {
        match &self.repr {
            Repr::Owned(bytes) => bytes.get(index).copied().ok_or(Error::IndexOutOfBounds {
                index,
                length: bytes.len(),
            }),
            Repr::Mapped(view) => {
                view.check_index(index)?;
                Ok(view.region().read_u8(view.data + index as u64)?)
            }
        }
    }

    /// Materializes the bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match &self.repr {
            Repr::Owned(bytes) => Ok(bytes.to_vec()),
            Repr::Mapped(view) => {
                let mut bytes = vec![0u8; view.len];
                view.region().read_bytes(view.data, &mut bytes)?;
                Ok(bytes)
            }
        }
    }

    pub(crate) fn equals(&self, other: &Binary) -> Result<bool> {
        if self.len() != other.len() || self.hash != other.hash {
            return Ok(false);
        }
        if let (Some(a), Some(b)) = (self.view(), other.view())
            && a.same_record(b)
        {
            return Ok(true);
        }
        Ok(self.to_bytes()? == other.to_bytes()?)
    }
}

impl PartialEq for Binary {
    fn eq(&self, other: &Binary) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_bytes() {
            Ok(bytes) => write!(f, "Binary({bytes:02x?})"),
            Err(_) => write!(f, "Binary({:?})", self.view()),
        }
    }
}

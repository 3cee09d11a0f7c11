mod detail {
    pub enum ByteContainer<'bytes> {
        Owned(Vec<u8>),
        Borrowed(&'bytes [u8]),
    }
}

use detail::ByteContainer::*;

pub struct ByteContainer<'bytes> {
    container: detail::ByteContainer<'bytes>,
}

impl<'bytes> ByteContainer<'bytes> {
    pub fn as_bytes(&self) -> &[u8] {
        match &self.container {
            Owned(x) => x,
            Borrowed(x) => x,
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        match &self.container {
            Owned(owner) => owner.as_ptr(),
            Borrowed(view) => view.as_ptr(),
        }
    }

    pub fn from_borrowed(bytes: &'bytes [u8]) -> Self {
        Self {
            container: Borrowed(bytes),
        }
    }

    pub fn from_owned(bytes: Vec<u8>) -> Self {
        Self {
            container: Owned(bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.container {
            Owned(x) => x.is_empty(),
            Borrowed(x) => x.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.container {
            Owned(x) => x.len(),
            Borrowed(x) => x.len(),
        }
    }

    pub fn into_owned<'owned>(self) -> ByteContainer<'owned> {
        ByteContainer {
            container: match self.container {
                Owned(x) => Owned(x),
                Borrowed(x) => Owned(x.to_owned()),
            },
        }
    }
}

impl<'bytes> Default for ByteContainer<'bytes> {
    fn default() -> Self {
        Self {
            container: Owned(Vec::new()),
        }
    }
}

/// A byte container that additionally tracks whether the bytes it holds are
/// still zlib-compressed. `decompressed_len` is `Some(n)` while the container
/// holds `n`-byte-inflatable compressed data, and `None` once the bytes are
/// the final, already-decompressed form (or were never compressed to begin
/// with, as with script-archive entries stored raw).
#[derive(Default)]
pub struct CompressableByteContainer<'bytes> {
    container: ByteContainer<'bytes>,
    decompressed_len: Option<usize>,
}

impl<'bytes> CompressableByteContainer<'bytes> {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.container.as_bytes()
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.container.as_ptr()
    }

    #[must_use]
    pub fn decompressed_len(&self) -> Option<usize> {
        self.decompressed_len
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.decompressed_len.is_some()
    }

    #[must_use]
    pub fn from_borrowed(bytes: &'bytes [u8], decompressed_len: Option<usize>) -> Self {
        Self {
            container: ByteContainer::from_borrowed(bytes),
            decompressed_len,
        }
    }

    #[must_use]
    pub fn from_owned(bytes: Vec<u8>, decompressed_len: Option<usize>) -> Self {
        Self {
            container: ByteContainer::from_owned(bytes),
            decompressed_len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.container.len()
    }

    #[must_use]
    pub fn into_owned<'owned>(self) -> CompressableByteContainer<'owned> {
        CompressableByteContainer {
            container: self.container.into_owned(),
            decompressed_len: self.decompressed_len,
        }
    }
}

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Display;

/// Error for a failed conversion from the transfer format
#[derive(Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransferFormatError {
    pub message: String,
}

impl TransferFormatError {
    /// Create a `TransferFormatError` for incorrect size
    pub fn bad_size<D1, D2>(name: &'static str, expected_len: D1, incorrect_len: D2) -> Self
    where
        D1: Display,
        D2: Display,
    {
        TransferFormatError {
            message: alloc::format!(
                "expected a size of {} bytes for {}, data length is {}",
                expected_len,
                name,
                incorrect_len
            ),
        }
    }

    /// Create a `TransferFormatError` when the size is smaller than the minimum
    pub fn bad_min_size<D1, D2>(name: &'static str, min_size: D1, data_len: D2) -> Self
    where
        D1: Display,
        D2: Display,
    {
        TransferFormatError {
            message: alloc::format!(
                "expected a minimum size of {} bytes for {}, data length is {}",
                min_size,
                name,
                data_len
            ),
        }
    }
}

impl From<String> for TransferFormatError {
    fn from(message: String) -> Self {
        TransferFormatError { message }
    }
}

impl From<&'_ str> for TransferFormatError {
    fn from(message: &'_ str) -> Self {
        TransferFormatError {
            message: message.to_string(),
        }
    }
}

impl core::fmt::Debug for TransferFormatError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Display::fmt(self, f)
    }
}

/// Try to create `Self` from the transferred bytes
///
/// The input must be exactly the bytes of the value. Any E2E-CRC must be checked and removed
/// before `try_from` is called.
pub trait TransferFormatTryFrom {
    fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError>
    where
        Self: Sized;
}

/// Convert `Self` into the transferred bytes
///
/// The combination of `len_of_into` and `build_into_ret` lets a containing type build its value
/// within a single buffer. The provided method `into` creates that buffer.
pub trait TransferFormatInto {
    /// Get the length of the return of `into`
    fn len_of_into(&self) -> usize;

    /// Build the return of `into`
    ///
    /// # Panic
    /// This may panic if the length of `into_ret` is not equal to the return of `len_of_into`.
    fn build_into_ret(&self, into_ret: &mut [u8]);

    /// Convert Self into the transferred bytes
    fn into(&self) -> Vec<u8> {
        let mut buffer = alloc::vec![0; self.len_of_into()];

        self.build_into_ret(&mut buffer);

        buffer
    }
}

macro_rules! impl_transfer_format_for_number {
    ( $num: ty ) => {
        impl TransferFormatTryFrom for $num {
            fn try_from(raw: &[u8]) -> Result<Self, TransferFormatError> {
                <[u8; core::mem::size_of::<$num>()]>::try_from(raw)
                    .map(<$num>::from_le_bytes)
                    .map_err(|_| {
                        TransferFormatError::bad_size(stringify!($num), core::mem::size_of::<$num>(), raw.len())
                    })
            }
        }

        impl TransferFormatInto for $num {
            fn len_of_into(&self) -> usize {
                core::mem::size_of::<$num>()
            }

            fn build_into_ret(&self, into_ret: &mut [u8]) {
                into_ret.copy_from_slice(&self.to_le_bytes())
            }
        }
    };
}

impl_transfer_format_for_number! {u8}
impl_transfer_format_for_number! {i8}
impl_transfer_format_for_number! {u16}
impl_transfer_format_for_number! {i16}
impl_transfer_format_for_number! {u32}

impl<T> TransferFormatInto for &T
where
    T: TransferFormatInto + ?Sized,
{
    fn len_of_into(&self) -> usize {
        (*self).len_of_into()
    }

    fn build_into_ret(&self, into_ret: &mut [u8]) {
        (*self).build_into_ret(into_ret)
    }
}

//! Code used for reporting upload and task progress.

use crate::errors::*;

/// A callback which will be called every time we have a new `T` value.
pub type ProgressCallback<'a, T> = dyn FnMut(&T) -> Result<()> + Send + 'a;

/// Options specifying how to report progress.
pub struct ProgressOptions<'a, T: 'static> {
    /// Our callback value. Only accessible from inside this crate.
    pub(crate) callback: Option<&'a mut ProgressCallback<'a, T>>,
}

impl<'a, T: 'static> ProgressOptions<'a, T> {
    /// Specify a callback to be called whenever we see a new `T` value.
    pub fn callback(mut self, callback: &'a mut ProgressCallback<'a, T>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Pass `value` to our callback, if we have one.
    pub(crate) fn notify(&mut self, value: &T) -> Result<()> {
        match self.callback {
            Some(ref mut callback) => callback(value),
            None => Ok(()),
        }
    }
}

impl<'a, T: 'static> Default for ProgressOptions<'a, T> {
    fn default() -> Self {
        ProgressOptions { callback: None }
    }
}

/// How far along a resumable upload is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes acknowledged by the server so far.
    pub bytes_uploaded: u64,
    /// Size of the whole file.
    pub total_bytes: u64,
}

impl UploadProgress {
    /// A number between 0.0 and 1.0.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_uploaded as f64 / self.total_bytes as f64
        }
    }
}

#[test]
fn callback_sees_every_value() {
    let mut seen = vec![];
    {
        let mut record = |p: &UploadProgress| -> Result<()> {
            seen.push(p.bytes_uploaded);
            Ok(())
        };
        let mut options = ProgressOptions::default().callback(&mut record);
        for n in &[1, 2, 3] {
            options
                .notify(&UploadProgress {
                    bytes_uploaded: *n,
                    total_bytes: 3,
                })
                .unwrap();
        }
    }
    assert_eq!(seen, vec![1, 2, 3]);
}

//! Content provider contract: positional readers over stored content.

use async_trait::async_trait;
use oci_distribution::manifest::OciDescriptor;
use std::io;

use crate::Result;

/// Sized reader supporting reads at arbitrary offsets.
pub trait ReaderAt: Send + Sync {
    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes read; `Ok(0)` once `offset` reaches
    /// [`ReaderAt::size`].
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Total size of the content in bytes.
    fn size(&self) -> u64;
}

/// Provides readers for content addressed by descriptor.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open a positional reader over the content of `desc`.
    async fn reader_at(&self, desc: &OciDescriptor) -> Result<Box<dyn ReaderAt>>;
}

/// Read the full content of `desc` from a provider.
pub async fn read_blob<P>(provider: &P, desc: &OciDescriptor) -> Result<Vec<u8>>
where
    P: Provider + ?Sized,
{
    let reader = provider.reader_at(desc).await?;
    let size = usize::try_from(reader.size())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut content = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read_at(&mut content[filled..], filled as u64)?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    Ok(content)
}

//! Hash-multiplexing stream over an attribute's `data` view: reads to
//! end-of-stream exactly once and produces a digest per requested
//! algorithm.

use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;
use sha2::Digest;

use crate::attrs::streams::AttributeStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

#[derive(Debug, Clone, Default)]
pub struct HashResults {
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
}

impl HashResults {
    pub fn get(&self, algo: HashAlgorithm) -> Option<&str> {
        match algo {
            HashAlgorithm::Md5 => self.md5.as_deref(),
            HashAlgorithm::Sha1 => self.sha1.as_deref(),
            HashAlgorithm::Sha256 => self.sha256.as_deref(),
        }
    }
}

/// Read `stream` to end-of-stream exactly once, updating every
/// requested algorithm's running digest in the same pass.
pub fn hash_stream(mut stream: AttributeStream, algorithms: &[HashAlgorithm]) -> HashResults {
    let want = |a: HashAlgorithm| algorithms.contains(&a);

    let mut md5 = want(HashAlgorithm::Md5).then(Md5::new);
    let mut sha1 = want(HashAlgorithm::Sha1).then(Sha1::new);
    let mut sha256 = want(HashAlgorithm::Sha256).then(Sha256::new);

    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = stream.read(&mut buf);
        if n == 0 {
            break;
        }
        if let Some(h) = md5.as_mut() {
            h.update(&buf[..n]);
        }
        if let Some(h) = sha1.as_mut() {
            h.update(&buf[..n]);
        }
        if let Some(h) = sha256.as_mut() {
            h.update(&buf[..n]);
        }
    }

    HashResults {
        md5: md5.map(|h| hex::encode(h.finalize())),
        sha1: sha1.map(|h| hex::encode(h.finalize())),
        sha256: sha256.map(|h| hex::encode(h.finalize())),
    }
}

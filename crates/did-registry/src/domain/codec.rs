//! # Binary Record Codec
//!
//! Canonical little-endian layout of the stored record:
//!
//! ```text
//! [8]  discriminator            (account envelope only)
//! [1]  version
//! [1]  bump
//! [8]  nonce
//! [..] initial method
//! [4]  method count     || methods
//! [4]  service count    || services
//! [4]  native count     || 32-byte keys
//! [4]  other count      || (u32 len || utf8)*
//! ```
//!
//! The reader never requires the whole buffer to be consumed. Accounts are
//! allocated larger than the record and newer layouts may append fields.

use super::entities::{
    DidRecord, LegacyDidRecord, LegacyVerificationMethod, Service, UpdateArgs,
    VerificationMethod, VerificationMethodType,
};
use super::errors::DidError;
use super::flags::VmFlags;
use super::identifier::Pubkey;
use sha2::{Digest, Sha256};

/// Size of the account discriminator prefix.
pub const DISCRIMINATOR_LEN: usize = 8;

/// `sha256("account:DidAccount")[..8]`
pub fn account_discriminator() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account:DidAccount")
}

/// First eight bytes of `sha256(preimage)`.
pub fn discriminator(preimage: &str) -> [u8; DISCRIMINATOR_LEN] {
    let hash = Sha256::digest(preimage.as_bytes());
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    out
}

// =============================================================================
// WRITER
// =============================================================================

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        self.write_u8(v as u8)
    }

    /// Raw bytes, no prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// `u32` length prefix then bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_u32(bytes.len() as u32);
        self.write_raw(bytes)
    }

    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.write_bytes(s.as_bytes())
    }

    pub fn write_pubkey(&mut self, key: &Pubkey) -> &mut Self {
        self.write_raw(key.as_bytes())
    }

    /// `u32` count then each element.
    pub fn write_seq<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) -> &mut Self {
        self.write_u32(items.len() as u32);
        for item in items {
            f(self, item);
        }
        self
    }

    pub fn write_option<T>(
        &mut self,
        item: Option<&T>,
        f: impl FnOnce(&mut Self, &T),
    ) -> &mut Self {
        match item {
            Some(v) => {
                self.write_u8(1);
                f(self, v);
            }
            None => {
                self.write_u8(0);
            }
        }
        self
    }

    pub fn write_method(&mut self, method: &VerificationMethod) -> &mut Self {
        self.write_str(&method.fragment)
            .write_u16(method.flags.bits())
            .write_u8(method.method_type as u8)
            .write_bytes(&method.key_data)
    }

    pub fn write_service(&mut self, service: &Service) -> &mut Self {
        self.write_str(&service.fragment)
            .write_str(&service.service_type)
            .write_str(&service.service_endpoint)
    }

    pub fn write_update_args(&mut self, args: &UpdateArgs) -> &mut Self {
        self.write_seq(&args.verification_methods, |w, m| {
            w.write_method(m);
        })
        .write_seq(&args.services, |w, s| {
            w.write_service(s);
        })
        .write_seq(&args.native_controllers, |w, k| {
            w.write_pubkey(k);
        })
        .write_seq(&args.other_controllers, |w, c| {
            w.write_str(c);
        })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// READER
// =============================================================================

/// Cursor over a byte slice. Trailing bytes are left untouched.
#[derive(Debug)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], DidError> {
        if self.remaining() < n {
            return Err(DidError::MalformedRecord(format!(
                "unexpected end of data reading {} at offset {} (need {}, have {})",
                what,
                self.pos,
                n,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], DidError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DidError> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DidError> {
        Ok(u16::from_le_bytes(self.take_array("u16")?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DidError> {
        Ok(u32::from_le_bytes(self.take_array("u32")?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DidError> {
        Ok(u64::from_le_bytes(self.take_array("u64")?))
    }

    pub fn read_bool(&mut self) -> Result<bool, DidError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DidError::MalformedRecord(format!("invalid bool {}", other))),
        }
    }

    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], DidError> {
        self.take(n, "raw bytes")
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DidError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len, "bytes")?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, DidError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| DidError::MalformedRecord(format!("invalid utf8: {}", e)))
    }

    pub fn read_pubkey(&mut self) -> Result<Pubkey, DidError> {
        Ok(Pubkey::new(self.take_array("pubkey")?))
    }

    /// `u32` count then elements. The count is bounded by what is left.
    pub fn read_seq<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, DidError>,
    ) -> Result<Vec<T>, DidError> {
        let count = self.read_u32()? as usize;
        if count > self.remaining() {
            return Err(DidError::MalformedRecord(format!(
                "sequence count {} exceeds remaining {} bytes",
                count,
                self.remaining()
            )));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(f(self)?);
        }
        Ok(items)
    }

    pub fn read_option<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, DidError>,
    ) -> Result<Option<T>, DidError> {
        if self.read_bool()? {
            f(self).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_method(&mut self) -> Result<VerificationMethod, DidError> {
        let fragment = self.read_string()?;
        let flags = VmFlags::from_bits(self.read_u16()?);
        let tag = self.read_u8()?;
        let method_type = VerificationMethodType::from_u8(tag)
            .ok_or_else(|| DidError::MalformedRecord(format!("unknown method type {}", tag)))?;
        let key_data = self.read_bytes()?;
        if key_data.len() != method_type.key_len() {
            return Err(DidError::MalformedRecord(format!(
                "method '{}' key is {} bytes, {:?} needs {}",
                fragment,
                key_data.len(),
                method_type,
                method_type.key_len()
            )));
        }
        Ok(VerificationMethod {
            fragment,
            flags,
            method_type,
            key_data,
        })
    }

    pub fn read_service(&mut self) -> Result<Service, DidError> {
        Ok(Service {
            fragment: self.read_string()?,
            service_type: self.read_string()?,
            service_endpoint: self.read_string()?,
        })
    }

    pub fn read_update_args(&mut self) -> Result<UpdateArgs, DidError> {
        Ok(UpdateArgs {
            verification_methods: self.read_seq(|r| r.read_method())?,
            services: self.read_seq(|r| r.read_service())?,
            native_controllers: self.read_seq(|r| r.read_pubkey())?,
            other_controllers: self.read_seq(|r| r.read_string())?,
        })
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// Encode the record body (no discriminator).
pub fn encode_record(record: &DidRecord) -> Vec<u8> {
    let mut w = RecordWriter::with_capacity(super::size::size_of_record(record));
    w.write_u8(record.version)
        .write_u8(record.bump)
        .write_u64(record.nonce)
        .write_method(&record.initial_method)
        .write_seq(&record.methods, |w, m| {
            w.write_method(m);
        })
        .write_seq(&record.services, |w, s| {
            w.write_service(s);
        })
        .write_seq(&record.native_controllers, |w, k| {
            w.write_pubkey(k);
        })
        .write_seq(&record.other_controllers, |w, c| {
            w.write_str(c);
        });
    w.into_bytes()
}

/// Decode a record body. Trailing bytes are ignored.
pub fn decode_record(data: &[u8]) -> Result<DidRecord, DidError> {
    read_record(&mut RecordReader::new(data))
}

fn read_record(r: &mut RecordReader<'_>) -> Result<DidRecord, DidError> {
    Ok(DidRecord {
        version: r.read_u8()?,
        bump: r.read_u8()?,
        nonce: r.read_u64()?,
        initial_method: r.read_method()?,
        methods: r.read_seq(|r| r.read_method())?,
        services: r.read_seq(|r| r.read_service())?,
        native_controllers: r.read_seq(|r| r.read_pubkey())?,
        other_controllers: r.read_seq(|r| r.read_string())?,
    })
}

/// Encode the stored account: discriminator then record body.
pub fn encode_account(record: &DidRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(super::size::total_storage_size(record));
    out.extend_from_slice(&account_discriminator());
    out.extend_from_slice(&encode_record(record));
    out
}

/// Decode a stored account. Trailing bytes (allocation slack) are ignored.
pub fn decode_account(data: &[u8]) -> Result<DidRecord, DidError> {
    let mut r = RecordReader::new(data);
    let disc = r.read_raw(DISCRIMINATOR_LEN)?;
    if disc != account_discriminator() {
        return Err(DidError::MalformedRecord(
            "account discriminator mismatch".to_string(),
        ));
    }
    read_record(&mut r)
}

// =============================================================================
// LEGACY RECORD
// =============================================================================

/// Encode a legacy-scheme record.
pub fn encode_legacy_record(record: &LegacyDidRecord) -> Vec<u8> {
    let mut w = RecordWriter::new();
    w.write_pubkey(&record.authority)
        .write_u8(record.version)
        .write_seq(&record.controllers, |w, k| {
            w.write_pubkey(k);
        })
        .write_seq(&record.methods, |w, m| {
            w.write_str(&m.fragment).write_pubkey(&m.key);
        });
    for list in [
        &record.authentication,
        &record.assertion_method,
        &record.key_agreement,
        &record.capability_invocation,
        &record.capability_delegation,
    ] {
        w.write_seq(list, |w, f| {
            w.write_str(f);
        });
    }
    w.write_seq(&record.services, |w, s| {
        w.write_service(s);
    });
    w.into_bytes()
}

/// Decode a legacy-scheme record. Legacy accounts are zero padded.
pub fn decode_legacy_record(data: &[u8]) -> Result<LegacyDidRecord, DidError> {
    let mut r = RecordReader::new(data);
    let authority = r.read_pubkey()?;
    let version = r.read_u8()?;
    let controllers = r.read_seq(|r| r.read_pubkey())?;
    let methods = r.read_seq(|r| {
        Ok(LegacyVerificationMethod {
            fragment: r.read_string()?,
            key: r.read_pubkey()?,
        })
    })?;
    let mut lists: Vec<Vec<String>> = Vec::with_capacity(5);
    for _ in 0..5 {
        lists.push(r.read_seq(|r| r.read_string())?);
    }
    let services = r.read_seq(|r| r.read_service())?;
    let mut lists = lists.into_iter();
    let mut next = || lists.next().unwrap_or_default();
    Ok(LegacyDidRecord {
        authority,
        version,
        controllers,
        methods,
        authentication: next(),
        assertion_method: next(),
        key_agreement: next(),
        capability_invocation: next(),
        capability_delegation: next(),
        services,
    })
}

// =============================================================================
// TEST HELPERS
// =============================================================================

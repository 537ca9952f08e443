//! The header store: one contiguous allocation holding the serialized
//! start-line and fields, plus an entry table growing down from the end
//! of the same allocation.
//!
//! Layout of the allocation (capacity `cap`):
//!
//! ```text
//! [0, prefix)                  start-line bytes, CRLF terminated
//! [prefix, size)               field lines, then the final blank CRLF
//! [cap - count*ENTRY, cap)     entry table, entry i highest in memory
//! ```
//!
//! The character area grows up, the table grows down, and they must never
//! meet. Entry offsets are relative to `prefix`, so start-line edits move
//! only bytes, never table contents. Entries are fixed-size records
//! encoded with `u16` little-endian fields, which keeps the whole store
//! in safe code.

use http::{Method, StatusCode, Version};

use crate::grammar::{self, ScanError, ValueCheck};
use crate::metadata::{Env, FieldId, Kind, Metadata};
use crate::{Error, Result};

pub(crate) const ENTRY_SIZE: usize = 12;

/// A single header block cannot exceed 64 KiB - 1 so that offsets and
/// lengths fit in 16 bits.
pub(crate) const MAX_BLOCK: usize = u16::MAX as usize;

const UNKNOWN_ID: u16 = 0xffff;

const DEFAULT_REQUEST: &[u8] = b"GET / HTTP/1.1\r\n\r\n";
const DEFAULT_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";
const DEFAULT_FIELDS: &[u8] = b"\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Entry {
    /// Name offset relative to `prefix`.
    pub np: u16,
    pub nn: u16,
    /// Value offset relative to `prefix`.
    pub vp: u16,
    pub vn: u16,
    pub id: Option<FieldId>,
}

fn entry_at(buf: &[u8], i: usize) -> Entry {
    let off = buf.len() - (i + 1) * ENTRY_SIZE;
    let g = |k: usize| u16::from_le_bytes([buf[off + k], buf[off + k + 1]]);
    Entry {
        np: g(0),
        nn: g(2),
        vp: g(4),
        vn: g(6),
        id: FieldId::from_code(g(8)),
    }
}

fn put_entry(buf: &mut [u8], i: usize, e: Entry) {
    let off = buf.len() - (i + 1) * ENTRY_SIZE;
    let mut p = |k: usize, v: u16| buf[off + k..off + k + 2].copy_from_slice(&v.to_le_bytes());
    p(0, e.np);
    p(2, e.nn);
    p(4, e.vp);
    p(6, e.vn);
    p(8, e.id.map(FieldId::to_code).unwrap_or(UNKNOWN_ID));
    p(10, 0);
}

/// The shared core of `Fields`, `Request` and `Response`.
#[derive(Debug, Clone)]
pub(crate) struct Store {
    buf: Option<Box<[u8]>>,
    prefix: usize,
    size: usize,
    count: usize,
    max_capacity: usize,
    kind: Kind,
    version: Version,
    // request start-line
    method: Method,
    method_len: usize,
    target_len: usize,
    // response start-line
    status: StatusCode,
    reason_len: usize,
    md: Metadata,
}

impl Store {
    pub fn new(kind: Kind) -> Store {
        let (prefix, size) = match kind {
            Kind::Fields => (0, DEFAULT_FIELDS.len()),
            Kind::Request => (16, DEFAULT_REQUEST.len()),
            Kind::Response => (17, DEFAULT_RESPONSE.len()),
        };
        Store {
            buf: None,
            prefix,
            size,
            count: 0,
            max_capacity: MAX_BLOCK,
            kind,
            version: Version::HTTP_11,
            method: Method::GET,
            method_len: 3,
            target_len: 1,
            status: StatusCode::OK,
            reason_len: 2,
            md: Metadata::default(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn env(&self) -> Env {
        Env {
            kind: self.kind,
            version: self.version,
            status: self.status.as_u16(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.md
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn prefix(&self) -> usize {
        self.prefix
    }

    /// The serialized header block, start-line through final CRLF.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.buf {
            Some(b) => &b[..self.size],
            None => self.default_bytes(),
        }
    }

    fn default_bytes(&self) -> &'static [u8] {
        match self.kind {
            Kind::Fields => DEFAULT_FIELDS,
            Kind::Request => DEFAULT_REQUEST,
            Kind::Response => DEFAULT_RESPONSE,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn set_max_capacity(&mut self, n: usize) {
        self.max_capacity = n.min(MAX_BLOCK);
    }

    pub fn entry(&self, i: usize) -> Entry {
        debug_assert!(i < self.count);
        // count > 0 implies an allocation exists
        entry_at(self.buf.as_deref().unwrap(), i)
    }

    pub fn name_bytes(&self, i: usize) -> &[u8] {
        let e = self.entry(i);
        &self.as_bytes()[self.prefix + e.np as usize..][..e.nn as usize]
    }

    pub fn value_bytes(&self, i: usize) -> &[u8] {
        let e = self.entry(i);
        &self.as_bytes()[self.prefix + e.vp as usize..][..e.vn as usize]
    }

    /// Index of the first field with this name.
    pub fn find(&self, name: &[u8]) -> Option<usize> {
        (0..self.count).find(|i| self.name_bytes(*i).eq_ignore_ascii_case(name))
    }

    pub fn target(&self) -> &[u8] {
        debug_assert!(self.kind == Kind::Request);
        &self.as_bytes()[self.method_len + 1..][..self.target_len]
    }

    pub fn reason(&self) -> &[u8] {
        debug_assert!(self.kind == Kind::Response);
        if self.reason_len == 0 {
            return &[];
        }
        &self.as_bytes()[13..][..self.reason_len]
    }

    // ---------------------------------------------------------------
    // capacity

    /// Grow (or materialize) the allocation so that `chars` character
    /// bytes and `entries` table entries fit without touching.
    fn ensure(&mut self, chars: usize, entries: usize) -> Result<()> {
        let need = chars + entries * ENTRY_SIZE;
        if self.buf.as_ref().map(|b| b.len() >= need).unwrap_or(false) {
            return Ok(());
        }
        let old_cap = self.capacity();
        // double on overflow, aligned to the entry size
        let want = need.max(old_cap * 2).max(4 * ENTRY_SIZE);
        let new_cap = (want + ENTRY_SIZE - 1) / ENTRY_SIZE * ENTRY_SIZE;
        self.realloc(new_cap);
        Ok(())
    }

    fn realloc(&mut self, new_cap: usize) {
        debug_assert!(new_cap >= self.size + self.count * ENTRY_SIZE);
        let mut new_buf = vec![0u8; new_cap].into_boxed_slice();
        new_buf[..self.size].copy_from_slice(self.as_bytes());
        if let Some(old) = &self.buf {
            let n = self.count * ENTRY_SIZE;
            new_buf[new_cap - n..].copy_from_slice(&old[old.len() - n..]);
        }
        self.buf = Some(new_buf);
    }

    pub fn reserve_bytes(&mut self, n: usize) -> Result<()> {
        if n > self.max_capacity {
            return Err(Error::LengthLimit);
        }
        self.ensure(n.max(self.size), self.count)
    }

    pub fn shrink_to_fit(&mut self) {
        let want = self.size + self.count * ENTRY_SIZE;
        let need = (want + ENTRY_SIZE - 1) / ENTRY_SIZE * ENTRY_SIZE;
        if self.buf.is_some() && self.capacity() > need {
            self.realloc(need);
        }
    }

    /// Reset to the default start-line for the kind. Capacity is kept.
    pub fn clear(&mut self) {
        let fresh = Store::new(self.kind);
        let buf = self.buf.take();
        *self = Store {
            max_capacity: self.max_capacity,
            ..fresh
        };
        if let Some(mut b) = buf {
            if b.len() >= self.size {
                b[..self.size].copy_from_slice(self.default_bytes());
                self.buf = Some(b);
            }
        }
    }

    // ---------------------------------------------------------------
    // field mutation

    /// Validate and measure one `Name: Value\r\n` field line.
    fn check_field(&self, name: &[u8], value: &[u8]) -> Result<usize> {
        if !grammar::is_valid_name(name) {
            return Err(Error::BadFieldName);
        }
        match grammar::check_value(value) {
            ValueCheck::Ok { .. } => {}
            ValueCheck::BadChar => return Err(Error::BadFieldValue),
            ValueCheck::Smuggle => return Err(Error::BadFieldSmuggle),
        }
        let sep = if value.is_empty() { 1 } else { 2 };
        Ok(name.len() + sep + value.len() + 2)
    }

    pub fn append(&mut self, name: &[u8], value: &[u8]) -> Result<()> {
        self.insert(self.count, name, value)
    }

    pub fn insert(&mut self, index: usize, name: &[u8], value: &[u8]) -> Result<()> {
        assert!(index <= self.count, "field index out of range");
        let flen = self.check_field(name, value)?;

        let new_size = self.size + flen;
        if new_size > self.max_capacity.min(MAX_BLOCK) || self.count + 1 > MAX_BLOCK {
            return Err(Error::LengthLimit);
        }
        self.ensure(new_size, self.count + 1)?;

        let pos = if index == self.count {
            self.size - 2
        } else {
            self.prefix + self.entry(index).np as usize
        };

        // invariant: ensure() above materialized the allocation
        let buf = self.buf.as_mut().unwrap();
        buf.copy_within(pos..self.size, pos + flen);

        // write the field line
        let mut w = pos;
        buf[w..w + name.len()].copy_from_slice(name);
        w += name.len();
        buf[w] = b':';
        w += 1;
        let vp;
        if value.is_empty() {
            vp = w;
        } else {
            buf[w] = b' ';
            w += 1;
            vp = w;
            buf[w..w + value.len()].copy_from_slice(value);
            w += value.len();
            rewrite_obs_folds(&mut buf[vp..w]);
        }
        buf[w..w + 2].copy_from_slice(b"\r\n");

        // shift the table for entries at and after the insertion point
        for j in (index..self.count).rev() {
            let mut e = entry_at(buf, j);
            e.np += flen as u16;
            e.vp += flen as u16;
            put_entry(buf, j + 1, e);
        }
        let id = FieldId::from_name(name);
        put_entry(
            buf,
            index,
            Entry {
                np: (pos - self.prefix) as u16,
                nn: name.len() as u16,
                vp: (vp - self.prefix) as u16,
                vn: value.len() as u16,
                id,
            },
        );

        self.count += 1;
        self.size = new_size;

        if let Some(id) = id {
            self.reindex(id, index);
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) {
        assert!(index < self.count, "field index out of range");
        let e = self.entry(index);
        let pos = self.prefix + e.np as usize;
        let flen = self.field_len(index);

        // invariant: count > 0 implies an allocation exists
        let buf = self.buf.as_mut().unwrap();
        buf.copy_within(pos + flen..self.size, pos);
        for j in index + 1..self.count {
            let mut en = entry_at(buf, j);
            en.np -= flen as u16;
            en.vp -= flen as u16;
            put_entry(buf, j - 1, en);
        }

        self.count -= 1;
        self.size -= flen;

        if let Some(id) = e.id {
            self.rescan(id);
        }
    }

    /// Remove every field with this name. Returns how many were removed.
    pub fn remove_all(&mut self, name: &[u8]) -> usize {
        let id = FieldId::from_name(name);
        let mut removed = 0;
        let mut read = 0;
        while read < self.count {
            if self.name_bytes(read).eq_ignore_ascii_case(name) {
                // compact one field; indices after `read` shift down
                let e = self.entry(read);
                let pos = self.prefix + e.np as usize;
                let flen = self.field_len(read);
                let buf = self.buf.as_mut().unwrap();
                buf.copy_within(pos + flen..self.size, pos);
                for j in read + 1..self.count {
                    let mut en = entry_at(buf, j);
                    en.np -= flen as u16;
                    en.vp -= flen as u16;
                    put_entry(buf, j - 1, en);
                }
                self.count -= 1;
                self.size -= flen;
                removed += 1;
            } else {
                read += 1;
            }
        }
        if removed > 0 {
            if let Some(id) = id {
                let env = self.env();
                self.md.on_erase_all(id, env);
            }
        }
        removed
    }

    /// Replace the value of the field at `index`.
    pub fn set_value(&mut self, index: usize, value: &[u8]) -> Result<()> {
        assert!(index < self.count, "field index out of range");
        match grammar::check_value(value) {
            ValueCheck::Ok { .. } => {}
            ValueCheck::BadChar => return Err(Error::BadFieldValue),
            ValueCheck::Smuggle => return Err(Error::BadFieldSmuggle),
        }

        let e = self.entry(index);
        let old_flen = self.field_len(index);
        let sep = if value.is_empty() { 1 } else { 2 };
        let new_flen = e.nn as usize + sep + value.len() + 2;

        let new_size = self.size + new_flen - old_flen;
        if new_size > self.max_capacity.min(MAX_BLOCK) {
            return Err(Error::LengthLimit);
        }
        self.ensure(new_size, self.count)?;

        let pos = self.prefix + e.np as usize;
        let tail = pos + old_flen;
        // invariant: ensure() above materialized the allocation
        let buf = self.buf.as_mut().unwrap();
        buf.copy_within(tail..self.size, pos + new_flen);

        let mut w = pos + e.nn as usize;
        buf[w] = b':';
        w += 1;
        let vp;
        if value.is_empty() {
            vp = w;
        } else {
            buf[w] = b' ';
            w += 1;
            vp = w;
            buf[w..w + value.len()].copy_from_slice(value);
            w += value.len();
            rewrite_obs_folds(&mut buf[vp..w]);
        }
        buf[w..w + 2].copy_from_slice(b"\r\n");

        let delta = new_flen as i32 - old_flen as i32;
        put_entry(
            buf,
            index,
            Entry {
                vp: (vp - self.prefix) as u16,
                vn: value.len() as u16,
                ..e
            },
        );
        for j in index + 1..self.count {
            let mut en = entry_at(buf, j);
            en.np = (en.np as i32 + delta) as u16;
            en.vp = (en.vp as i32 + delta) as u16;
            put_entry(buf, j, en);
        }

        self.size = new_size;

        if let Some(id) = e.id {
            self.rescan(id);
        }
        Ok(())
    }

    /// Remove all fields with this name, then append one.
    pub fn set(&mut self, name: &[u8], value: &[u8]) -> Result<()> {
        // validate before erasing so a bad value leaves the store intact
        self.check_field(name, value)?;
        self.remove_all(name);
        self.append(name, value)
    }

    fn field_len(&self, index: usize) -> usize {
        let e = self.entry(index);
        let next = if index + 1 == self.count {
            self.size - 2 - self.prefix
        } else {
            self.entry(index + 1).np as usize
        };
        next - e.np as usize
    }

    // ---------------------------------------------------------------
    // metadata maintenance

    /// Rebuild the summary for `id` from all current fields of that id.
    fn rescan(&mut self, id: FieldId) {
        let env = self.env();
        let prefix = self.prefix;
        let count = self.count;
        let buf = self.buf.as_deref().unwrap_or(&[]);
        let values = (0..count).filter_map(|i| {
            let e = entry_at(buf, i);
            (e.id == Some(id)).then(|| &buf[prefix + e.vp as usize..][..e.vn as usize])
        });
        self.md.on_rescan(id, values, env);
    }

    /// After inserting field `index` with special id `id`, update the
    /// summaries. Most ids take the incremental path; transfer-encoding
    /// is order sensitive and always re-scans.
    fn reindex(&mut self, id: FieldId, index: usize) {
        if id == FieldId::TransferEncoding {
            self.rescan(id);
            return;
        }
        let env = self.env();
        let e = self.entry(index);
        let prefix = self.prefix;
        let buf = self.buf.as_deref().unwrap_or(&[]);
        let value = &buf[prefix + e.vp as usize..][..e.vn as usize];
        self.md.on_insert(id, value, env);
    }

    // ---------------------------------------------------------------
    // start-line mutation

    /// Replace `[0, prefix)` with new start-line bytes, shifting the
    /// field area. Entry offsets are prefix relative and stay put.
    fn replace_prefix(&mut self, line: &[u8]) -> Result<()> {
        debug_assert!(line.ends_with(b"\r\n"));
        let new_size = self.size + line.len() - self.prefix;
        if new_size > self.max_capacity.min(MAX_BLOCK) {
            return Err(Error::LengthLimit);
        }
        self.ensure(new_size, self.count)?;
        // invariant: ensure() above materialized the allocation
        let buf = self.buf.as_mut().unwrap();
        if line.len() != self.prefix {
            buf.copy_within(self.prefix..self.size, line.len());
        }
        buf[..line.len()].copy_from_slice(line);
        self.prefix = line.len();
        self.size = new_size;
        Ok(())
    }

    /// Set the request-line. `target` must be a non-empty run of
    /// printable bytes.
    pub fn set_request_line(
        &mut self,
        method: Method,
        target: &[u8],
        version: Version,
    ) -> Result<()> {
        debug_assert!(self.kind == Kind::Request);
        if target.is_empty() || !target.iter().all(|c| c.is_ascii_graphic()) {
            return Err(Error::BadStartLine);
        }
        version_str(version)?;

        let m = method.as_str().as_bytes();
        let mut line = Vec::with_capacity(m.len() + target.len() + 13);
        line.extend_from_slice(m);
        line.push(b' ');
        line.extend_from_slice(target);
        line.push(b' ');
        line.extend_from_slice(version_str(version)?);
        line.extend_from_slice(b"\r\n");
        self.replace_prefix(&line)?;

        self.method_len = m.len();
        self.target_len = target.len();
        self.method = method;
        self.version = version;
        let env = self.env();
        self.md.on_start_line(env);
        Ok(())
    }

    /// Set the status-line. An empty reason omits the trailing space.
    pub fn set_status_line(
        &mut self,
        status: StatusCode,
        reason: &[u8],
        version: Version,
    ) -> Result<()> {
        debug_assert!(self.kind == Kind::Response);
        if !reason
            .iter()
            .all(|c| grammar::is_field_vchar(*c) || grammar::is_ows(*c))
        {
            return Err(Error::BadStartLine);
        }

        let mut line = Vec::with_capacity(15 + reason.len());
        line.extend_from_slice(version_str(version)?);
        line.push(b' ');
        line.extend_from_slice(status.as_str().as_bytes());
        if !reason.is_empty() {
            line.push(b' ');
            line.extend_from_slice(reason);
        }
        line.extend_from_slice(b"\r\n");
        self.replace_prefix(&line)?;

        self.status = status;
        self.reason_len = reason.len();
        self.version = version;
        let env = self.env();
        self.md.on_start_line(env);
        Ok(())
    }

    // ---------------------------------------------------------------
    // wholesale parse

    /// Parse a complete serialized header block into this store,
    /// replacing its contents. The block bytes are retained verbatim
    /// (only obs-folds are rewritten to spaces), so serializing again
    /// reproduces the input. Returns the number of bytes consumed.
    pub fn parse_block(&mut self, input: &[u8]) -> Result<usize> {
        let mut entries: Vec<Entry> = Vec::new();

        // start-line
        let prefix;
        let mut method = Method::GET;
        let mut method_len = 3;
        let mut target_len = 1;
        let mut status = StatusCode::OK;
        let mut reason_len = 2;
        let mut version = Version::HTTP_11;

        match self.kind {
            Kind::Fields => prefix = 0,
            Kind::Request => {
                let rl = map_scan(grammar::request_line(input), Error::BadStartLine)?;
                method = Method::from_bytes(&input[..rl.method_len])
                    .map_err(|_| Error::BadStartLine)?;
                method_len = rl.method_len;
                target_len = rl.target_len;
                version = rl.version;
                prefix = rl.consumed;
            }
            Kind::Response => {
                let sl = map_scan(grammar::status_line(input), Error::BadStartLine)?;
                status = StatusCode::from_u16(sl.status).map_err(|_| Error::BadStartLine)?;
                let reason = &input[sl.reason_start..sl.reason_start + sl.reason_len];
                std::str::from_utf8(reason).map_err(|_| Error::BadStartLine)?;
                reason_len = sl.reason_len;
                version = sl.version;
                prefix = sl.consumed;
            }
        }

        // fields
        let mut i = prefix;
        let end = loop {
            match grammar::crlf(&input[i..]) {
                Ok(n) => break i + n,
                Err(ScanError::NeedMore) => return Err(Error::NeedData),
                Err(ScanError::Mismatch) => {}
            }
            let nn = map_scan(grammar::field_name(&input[i..]), Error::BadFieldName)?;
            let vstart = i + nn + 1;
            let fv = map_scan(grammar::field_value(&input[vstart..]), Error::BadFieldValue)?;
            if i + nn + 1 + fv.consumed - prefix > MAX_BLOCK {
                return Err(Error::LengthLimit);
            }
            entries.push(Entry {
                np: (i - prefix) as u16,
                nn: nn as u16,
                vp: (vstart + fv.start - prefix) as u16,
                vn: (fv.end - fv.start) as u16,
                id: FieldId::from_name(&input[i..i + nn]),
            });
            i = vstart + fv.consumed;
        };

        if end > MAX_BLOCK || end > self.max_capacity || entries.len() > MAX_BLOCK {
            return Err(Error::LengthLimit);
        }

        // commit: single allocation, verbatim copy, obs-folds to spaces
        self.count = 0;
        self.size = 0;
        self.prefix = 0;
        self.ensure(end, entries.len())?;
        // invariant: ensure() above materialized the allocation
        let buf = self.buf.as_mut().unwrap();
        buf[..end].copy_from_slice(&input[..end]);
        rewrite_obs_folds(&mut buf[prefix..end - 2]);
        for (i, e) in entries.iter().enumerate() {
            put_entry(buf, i, *e);
        }

        self.prefix = prefix;
        self.size = end;
        self.count = entries.len();
        self.version = version;
        self.method = method;
        self.method_len = method_len;
        self.target_len = target_len;
        self.status = status;
        self.reason_len = reason_len;

        // metadata from scratch
        let env = self.env();
        self.md = Metadata::default();
        let mut te_seen = false;
        for i in 0..self.count {
            let e = self.entry(i);
            let Some(id) = e.id else { continue };
            if id == FieldId::TransferEncoding {
                te_seen = true;
                continue;
            }
            let buf = self.buf.as_deref().unwrap_or(&[]);
            let value = &buf[self.prefix + e.vp as usize..][..e.vn as usize];
            self.md.on_insert(id, value, env);
        }
        if te_seen {
            self.rescan(FieldId::TransferEncoding);
        }
        let env = self.env();
        self.md.on_start_line(env);

        Ok(end)
    }
}

fn map_scan<T>(r: core::result::Result<T, ScanError>, mismatch: Error) -> Result<T> {
    r.map_err(|e| match e {
        ScanError::NeedMore => Error::NeedData,
        ScanError::Mismatch => mismatch,
    })
}

fn version_str(version: Version) -> Result<&'static [u8]> {
    if version == Version::HTTP_10 {
        Ok(b"HTTP/1.0")
    } else if version == Version::HTTP_11 {
        Ok(b"HTTP/1.1")
    } else {
        Err(Error::BadVersion)
    }
}

/// Rewrite every obs-fold CRLF in the region to two spaces.
///
/// Only a CRLF followed by SP or HTAB is a fold; a CRLF followed by
/// anything else is a genuine line terminator and is left alone.
fn rewrite_obs_folds(region: &mut [u8]) {
    let mut i = 0;
    while i + 2 < region.len() {
        if region[i] == b'\r' && region[i + 1] == b'\n' && grammar::is_ows(region[i + 2]) {
            region[i] = b' ';
            region[i + 1] = b' ';
            i += 3;
        } else {
            i += 1;
        }
    }
}

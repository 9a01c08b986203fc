//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) workbooks.
//! Only the read path needed to extract a named stream is implemented.

use crate::error::DrillLedgerError;
use crate::helpers::bytes::pointers;
use crate::helpers::bytes::LittleEndian;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

pub(crate) const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;
/// Sector ids above this value are markers (free, end of chain, FAT, DIFAT)
const MAX_REG_SECT: usize = 0xFFFF_FFFA;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector chain starting at '{0}' is broken or cyclic")]
    SectorChainError(usize),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// An in-memory compound file: the raw bytes plus the allocation tables needed to follow stream chains.
pub(crate) struct Cfb {
    data: Vec<u8>,
    sector_size: usize,
    fat: Vec<usize>,
    mini_fat: Vec<usize>,
    mini_stream: Vec<u8>,
    streams: HashMap<String, Stream>,
}

/// Location of a named stream inside the compound file
#[derive(Debug, Clone, Copy)]
struct Stream {
    start: usize,
    size: usize,
}

impl Cfb {
    /// Reads the whole compound file and indexes its directory.
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, DrillLedgerError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; size];
        reader.read_exact(&mut data)?;

        let header = Header::parse(&data)?;
        let mut cfb = Cfb {
            data,
            sector_size: header.sector_size,
            fat: Vec::new(),
            mini_fat: Vec::new(),
            mini_stream: Vec::new(),
            streams: HashMap::new(),
        };
        cfb.fat = cfb.load_fat(&header)?;
        cfb.streams = cfb.load_directory(header.directory_start)?;
        if header.mini_fat_sectors > 0 {
            let table = cfb.follow(header.mini_fat_start)?;
            cfb.mini_fat = pointers(&table).collect();
        }
        if let Some(root) = cfb.streams.get("Root Entry").copied() {
            let mut mini_stream = cfb.follow(root.start)?;
            mini_stream.truncate(root.size);
            cfb.mini_stream = mini_stream;
        }
        Ok(cfb)
    }

    /// Checks if a stream exists in the compound file
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    /// Returns the content of a named stream, or None if the stream is absent.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, DrillLedgerError> {
        let Some(stream) = self.streams.get(name) else {
            return Ok(None);
        };
        let mut bytes = if stream.size < MINI_STREAM_CUTOFF {
            self.follow_mini(stream.start)?
        } else {
            self.follow(stream.start)?
        };
        bytes.truncate(stream.size);
        Ok(Some(bytes))
    }

    /// Collects the FAT from the header's DIFAT array and any chained DIFAT sectors.
    fn load_fat(&self, header: &Header) -> Result<Vec<usize>, DrillLedgerError> {
        let mut fat_sectors: Vec<usize> = pointers(self.slice(76, HEADER_SIZE)?).collect();
        let mut next = header.difat_start;
        let mut visited = 0usize;
        while next <= MAX_REG_SECT {
            visited += 1;
            if visited > header.difat_sectors {
                Err(CfbError::SectorChainError(header.difat_start))?;
            }
            let mut entries: Vec<usize> = pointers(self.sector(next)?).collect();
            // The last entry of a DIFAT sector links to the next DIFAT sector
            next = entries.pop().ok_or(CfbError::FileFormatError)?;
            fat_sectors.extend(entries);
        }

        let mut fat = Vec::new();
        for sector in fat_sectors.into_iter().filter(|sector| *sector <= MAX_REG_SECT) {
            fat.extend(pointers(self.sector(sector)?));
        }
        if fat.is_empty() {
            Err(CfbError::FileFormatError)?;
        }
        Ok(fat)
    }

    /// Parses the directory entries into a name-indexed map.
    fn load_directory(&self, start: usize) -> Result<HashMap<String, Stream>, DrillLedgerError> {
        let bytes = self.follow(start)?;
        let mut streams = HashMap::new();
        for entry in bytes.chunks_exact(DIRECTORY_ENTRY_SIZE) {
            let name_length = (entry.u16_at(64).ok_or(CfbError::FileFormatError)? as usize).min(64);
            let (name, _, _) = UTF_16LE.decode(&entry[..name_length]);
            let name = name.split('\0').next().unwrap_or_default().to_owned();
            if name.is_empty() {
                continue;
            }
            let start = entry.usize_at(116).ok_or(CfbError::FileFormatError)?;
            let size = entry.u64_at(120).ok_or(CfbError::FileFormatError)? as usize;
            streams.insert(name, Stream { start, size });
        }
        if streams.is_empty() {
            Err(CfbError::RootDirectoryError)?
        }
        Ok(streams)
    }

    /// Concatenates the regular sectors of the chain beginning at `start`.
    fn follow(&self, start: usize) -> Result<Vec<u8>, DrillLedgerError> {
        let mut content = Vec::new();
        let mut index = start;
        let mut steps = 0usize;
        while index <= MAX_REG_SECT {
            steps += 1;
            if steps > self.fat.len() {
                Err(CfbError::SectorChainError(start))?;
            }
            content.extend_from_slice(self.sector(index)?);
            index = *self.fat.get(index).ok_or(CfbError::SectorChainError(start))?;
        }
        Ok(content)
    }

    /// Concatenates the mini sectors of the chain beginning at `start`.
    fn follow_mini(&self, start: usize) -> Result<Vec<u8>, DrillLedgerError> {
        let mut content = Vec::new();
        let mut index = start;
        let mut steps = 0usize;
        while index <= MAX_REG_SECT {
            steps += 1;
            if steps > self.mini_fat.len() {
                Err(CfbError::SectorChainError(start))?;
            }
            let lower = index * MINI_SECTOR_SIZE;
            let upper = (lower + MINI_SECTOR_SIZE).min(self.mini_stream.len());
            let sector = self.mini_stream.get(lower..upper).ok_or(CfbError::SectorChainError(start))?;
            content.extend_from_slice(sector);
            index = *self.mini_fat.get(index).ok_or(CfbError::SectorChainError(start))?;
        }
        Ok(content)
    }

    /// Sector `index` lives right after the header-sized sector 0 slot.
    fn sector(&self, index: usize) -> Result<&[u8], DrillLedgerError> {
        let lower = (index + 1) * self.sector_size;
        let upper = (lower + self.sector_size).min(self.data.len());
        self.slice(lower, upper)
    }

    fn slice(&self, lower: usize, upper: usize) -> Result<&[u8], DrillLedgerError> {
        Ok(self.data.get(lower..upper).ok_or(CfbError::FileFormatError)?)
    }
}

/// The fields of the 512-byte CFB header that the reader needs
#[derive(Debug)]
struct Header {
    sector_size: usize,
    directory_start: usize,
    mini_fat_start: usize,
    mini_fat_sectors: usize,
    difat_start: usize,
    difat_sectors: usize,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Header, DrillLedgerError> {
        let field = |offset: usize| data.usize_at(offset).ok_or(CfbError::FileFormatError);
        if data.u64_at(0) != Some(SIGNATURE) {
            Err(CfbError::OleSignatureError)?;
        }
        let major_version = data.u16_at(26).ok_or(CfbError::FileFormatError)?;
        let sector_shift = data.u16_at(30).ok_or(CfbError::FileFormatError)?;
        let sector_size = match (major_version, sector_shift) {
            (3, 0x0009) => 512,
            // Version 4 pads the rest of the first 4096-byte sector with zeroes
            (4, 0x000C) => 4096,
            _ => Err(CfbError::SectorSizeError(major_version, sector_shift))?,
        };
        Ok(Header {
            sector_size,
            directory_start: field(48)?,
            mini_fat_start: field(60)?,
            mini_fat_sectors: field(64)?,
            difat_start: field(68)?,
            difat_sectors: field(72)?,
        })
    }
}

/// Builds a version 3 compound file holding `streams`. Streams under the cutoff go to the mini stream.
#[cfg(test)]
pub(crate) fn compound_file(streams: &[(&str, &[u8])]) -> Vec<u8> {
    const SECTOR_SIZE: usize = 512;
    const FREE_SECT: u32 = 0xFFFF_FFFF;
    const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
    const FAT_SECT: u32 = 0xFFFF_FFFD;

    /// Links `count` consecutive entries of `table` from `next` on and returns the chain start.
    fn allocate(table: &mut Vec<u32>, next: &mut usize, count: usize) -> u32 {
        if count == 0 {
            return END_OF_CHAIN;
        }
        let start = *next;
        table.resize(table.len().max(start + count), FREE_SECT);
        for index in start..start + count {
            table[index] = if index + 1 < start + count { index as u32 + 1 } else { END_OF_CHAIN };
        }
        *next += count;
        start as u32
    }

    fn directory_entry(name: &str, kind: u8, right: u32, child: u32, start: u32, size: usize) -> Vec<u8> {
        let mut entry = vec![0u8; DIRECTORY_ENTRY_SIZE];
        let name: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
        entry[..name.len()].copy_from_slice(&name);
        entry[64..66].copy_from_slice(&(name.len() as u16 + 2).to_le_bytes());
        entry[66] = kind;
        entry[67] = 1;
        entry[68..72].copy_from_slice(&FREE_SECT.to_le_bytes());
        entry[72..76].copy_from_slice(&right.to_le_bytes());
        entry[76..80].copy_from_slice(&child.to_le_bytes());
        entry[116..120].copy_from_slice(&start.to_le_bytes());
        entry[120..128].copy_from_slice(&(size as u64).to_le_bytes());
        entry
    }

    let mut mini_fat = Vec::new();
    let mut mini_stream = Vec::new();
    let mut starts = vec![END_OF_CHAIN; streams.len()];
    for (index, &(_, bytes)) in streams.iter().enumerate() {
        if bytes.len() < MINI_STREAM_CUTOFF {
            let mut next = mini_fat.len();
            starts[index] = allocate(&mut mini_fat, &mut next, bytes.len().div_ceil(MINI_SECTOR_SIZE));
            mini_stream.extend_from_slice(bytes);
            mini_stream.resize(mini_stream.len().next_multiple_of(MINI_SECTOR_SIZE), 0);
        }
    }
    let mini_fat: Vec<u8> = mini_fat.into_iter().flat_map(u32::to_le_bytes).collect();

    let directory_sectors = ((streams.len() + 1) * DIRECTORY_ENTRY_SIZE).div_ceil(SECTOR_SIZE);
    let mini_fat_sectors = mini_fat.len().div_ceil(SECTOR_SIZE);
    let mini_stream_sectors = mini_stream.len().div_ceil(SECTOR_SIZE);
    let regular_sectors: usize = streams
        .iter()
        .filter(|(_, bytes)| bytes.len() >= MINI_STREAM_CUTOFF)
        .map(|(_, bytes)| bytes.len().div_ceil(SECTOR_SIZE))
        .sum();
    let content_sectors = directory_sectors + mini_fat_sectors + mini_stream_sectors + regular_sectors;
    let mut fat_sectors = 1;
    while fat_sectors * SECTOR_SIZE / 4 < content_sectors + fat_sectors {
        fat_sectors += 1;
    }
    assert!(fat_sectors <= 109, "too large for the header DIFAT");

    let mut fat = vec![FAT_SECT; fat_sectors];
    let mut next = fat_sectors;
    let directory_start = allocate(&mut fat, &mut next, directory_sectors);
    let mini_fat_start = allocate(&mut fat, &mut next, mini_fat_sectors);
    let mini_stream_start = allocate(&mut fat, &mut next, mini_stream_sectors);
    for (index, &(_, bytes)) in streams.iter().enumerate() {
        if bytes.len() >= MINI_STREAM_CUTOFF {
            starts[index] = allocate(&mut fat, &mut next, bytes.len().div_ceil(SECTOR_SIZE));
        }
    }
    fat.resize(fat_sectors * SECTOR_SIZE / 4, FREE_SECT);

    let mut directory = directory_entry("Root Entry", 5, FREE_SECT, 1, mini_stream_start, mini_stream.len());
    for (index, &(name, bytes)) in streams.iter().enumerate() {
        let right = if index + 1 < streams.len() { index as u32 + 2 } else { FREE_SECT };
        directory.extend(directory_entry(name, 2, right, FREE_SECT, starts[index], bytes.len()));
    }

    let mut data = vec![0u8; HEADER_SIZE + next * SECTOR_SIZE];
    data[..8].copy_from_slice(&SIGNATURE.to_le_bytes());
    data[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    data[26..28].copy_from_slice(&3u16.to_le_bytes());
    data[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    data[30..32].copy_from_slice(&9u16.to_le_bytes());
    data[32..34].copy_from_slice(&6u16.to_le_bytes());
    data[44..48].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
    data[48..52].copy_from_slice(&directory_start.to_le_bytes());
    data[56..60].copy_from_slice(&(MINI_STREAM_CUTOFF as u32).to_le_bytes());
    data[60..64].copy_from_slice(&mini_fat_start.to_le_bytes());
    data[64..68].copy_from_slice(&(mini_fat_sectors as u32).to_le_bytes());
    data[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    for slot in 0..109 {
        let sector = if slot < fat_sectors { slot as u32 } else { FREE_SECT };
        data[76 + slot * 4..80 + slot * 4].copy_from_slice(&sector.to_le_bytes());
    }

    let mut place = |start: u32, bytes: &[u8]| {
        if start != END_OF_CHAIN {
            let offset = HEADER_SIZE + start as usize * SECTOR_SIZE;
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
    };
    let fat: Vec<u8> = fat.into_iter().flat_map(u32::to_le_bytes).collect();
    place(0, &fat);
    place(directory_start, &directory);
    place(mini_fat_start, &mini_fat);
    place(mini_stream_start, &mini_stream);
    for (index, &(_, bytes)) in streams.iter().enumerate() {
        if bytes.len() >= MINI_STREAM_CUTOFF {
            place(starts[index], bytes);
        }
    }
    data
}

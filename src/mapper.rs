//! Cartridge mapper metadata and the iNES 2.0 header.

use crate::error::{CompileError, Result};

/// Supported cartridge mappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MapperKind {
    Nrom,
    Cnrom,
    Anrom,
    Bnrom,
    Gnrom,
    Gtrom,
}

impl MapperKind {
    /// The iNES mapper number.
    pub const fn number(self) -> u16 {
        match self {
            MapperKind::Nrom => 0,
            MapperKind::Cnrom => 3,
            MapperKind::Anrom => 7,
            MapperKind::Bnrom => 34,
            MapperKind::Gnrom => 66,
            MapperKind::Gtrom => 111,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MapperKind::Nrom => "NROM",
            MapperKind::Cnrom => "CNROM",
            MapperKind::Anrom => "ANROM",
            MapperKind::Bnrom => "BNROM",
            MapperKind::Gnrom => "GNROM",
            MapperKind::Gtrom => "GTROM",
        }
    }
}

/// Nametable mirroring arrangements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mirroring {
    /// Unspecified; each mapper picks its default.
    None,
    Horizontal,
    Vertical,
    FourScreen,
}

/// User-requested cartridge parameters, sizes in KiB. Zero sizes take
/// the mapper's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapperParams {
    pub mirroring: Option<Mirroring>,
    pub prg_size: u32,
    pub chr_size: u32,
}

impl MapperParams {
    fn mirroring_none(&self, kind: MapperKind) -> Result<Mirroring, CompileError> {
        match self.mirroring {
            None | Some(Mirroring::None) => Ok(Mirroring::None),
            Some(_) => Err(CompileError::new(
                None,
                format!("unsupported {} mirroring", kind.name()),
            )),
        }
    }

    fn mirroring_hv(&self, kind: MapperKind) -> Result<Mirroring, CompileError> {
        match self.mirroring {
            None | Some(Mirroring::None) => Ok(Mirroring::Vertical),
            Some(m @ (Mirroring::Horizontal | Mirroring::Vertical)) => Ok(m),
            Some(_) => Err(CompileError::new(
                None,
                format!("unsupported {} mirroring; expecting H or V", kind.name()),
            )),
        }
    }

    fn mirroring_4(&self, kind: MapperKind) -> Result<Mirroring, CompileError> {
        match self.mirroring {
            None | Some(Mirroring::None) | Some(Mirroring::FourScreen) => Ok(Mirroring::FourScreen),
            Some(_) => Err(CompileError::new(
                None,
                format!("unsupported {} mirroring; expecting four-screen", kind.name()),
            )),
        }
    }

    /// PRG size in 32-KiB banks, bounds inclusive and in banks.
    fn num_32k_banks(
        &self,
        kind: MapperKind,
        min: u32,
        max: u32,
        default: u32,
    ) -> Result<u32, CompileError> {
        if self.prg_size == 0 {
            return Ok(default);
        }
        let err = |what: &str| {
            CompileError::new(
                None,
                format!("invalid {} PRG size: {} KiB; {what}", kind.name(), self.prg_size),
            )
        };
        if self.prg_size % 32 != 0 {
            return Err(err("expecting a multiple of 32"));
        }
        let banks = self.prg_size / 32;
        if banks < min {
            return Err(err(&format!("minimum accepted: {} KiB", min * 32)));
        }
        if banks > max {
            return Err(err(&format!("maximum accepted: {} KiB", max * 32)));
        }
        Ok(banks)
    }

    /// CHR size in 8-KiB banks.
    fn num_8k_chr(
        &self,
        kind: MapperKind,
        min: u32,
        max: u32,
        default: u32,
    ) -> Result<u32, CompileError> {
        if self.chr_size == 0 {
            return Ok(default);
        }
        let err = |what: &str| {
            CompileError::new(
                None,
                format!("invalid {} CHR size: {} KiB; {what}", kind.name(), self.chr_size),
            )
        };
        if self.chr_size % 8 != 0 {
            return Err(err("expecting a multiple of 8"));
        }
        let banks = self.chr_size / 8;
        if banks < min {
            return Err(err(&format!("minimum accepted: {} KiB", min * 8)));
        }
        if banks > max {
            return Err(err(&format!("maximum accepted: {} KiB", max * 8)));
        }
        Ok(banks)
    }
}

/// A validated cartridge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mapper {
    pub kind: MapperKind,
    pub mirroring: Mirroring,
    pub num_32k_banks: u32,
    pub num_8k_chr_rom: u32,
    pub num_8k_chr_ram: u32,
}

impl Mapper {
    pub fn new(kind: MapperKind, params: &MapperParams) -> Result<Mapper, CompileError> {
        match kind {
            MapperKind::Nrom => Ok(Mapper {
                kind,
                mirroring: params.mirroring_hv(kind)?,
                num_32k_banks: params.num_32k_banks(kind, 1, 1, 1)?,
                num_8k_chr_rom: params.num_8k_chr(kind, 1, 1, 1)?,
                num_8k_chr_ram: 0,
            }),
            MapperKind::Cnrom => Ok(Mapper {
                kind,
                mirroring: params.mirroring_hv(kind)?,
                num_32k_banks: params.num_32k_banks(kind, 1, 1, 1)?,
                num_8k_chr_rom: params.num_8k_chr(kind, 1, 256, 1)?,
                num_8k_chr_ram: 0,
            }),
            MapperKind::Anrom => Ok(Mapper {
                kind,
                mirroring: params.mirroring_none(kind)?,
                num_32k_banks: params.num_32k_banks(kind, 1, 16, 1)?,
                num_8k_chr_rom: 0,
                num_8k_chr_ram: params.num_8k_chr(kind, 1, 1, 1)?,
            }),
            MapperKind::Bnrom => Ok(Mapper {
                kind,
                mirroring: params.mirroring_hv(kind)?,
                num_32k_banks: params.num_32k_banks(kind, 1, 64, 1)?,
                num_8k_chr_rom: 0,
                num_8k_chr_ram: params.num_8k_chr(kind, 1, 1, 1)?,
            }),
            MapperKind::Gnrom => Ok(Mapper {
                kind,
                mirroring: params.mirroring_hv(kind)?,
                num_32k_banks: params.num_32k_banks(kind, 1, 16, 1)?,
                num_8k_chr_rom: params.num_8k_chr(kind, 1, 16, 1)?,
                num_8k_chr_ram: 0,
            }),
            MapperKind::Gtrom => Ok(Mapper {
                kind,
                mirroring: params.mirroring_4(kind)?,
                num_32k_banks: params.num_32k_banks(kind, 1, 16, 1)?,
                num_8k_chr_rom: 0,
                num_8k_chr_ram: params.num_8k_chr(kind, 1, 2, 1)?,
            }),
        }
    }

    /// PRG size in the header's 16-KiB units.
    pub const fn num_16k_banks(&self) -> u32 {
        self.num_32k_banks * 2
    }
}

/// Write the 16-byte iNES 2.0 header.
pub fn write_ines_header(out: &mut [u8; 16], mapper: &Mapper) -> Result<(), CompileError> {
    // 0-3: magic
    out[0..4].copy_from_slice(&[0x4E, 0x45, 0x53, 0x1A]);

    // 4: PRG banks in 16 KiB units, low byte.
    out[4] = mapper.num_16k_banks() as u8;

    // 5: CHR-ROM banks in 8 KiB units, low byte.
    out[5] = mapper.num_8k_chr_rom as u8;

    // 6: mirroring bits plus mapper low nibble.
    let mut flags6 = 0u8;
    flags6 |= (mapper.kind.number() as u8) << 4;
    match mapper.mirroring {
        Mirroring::Vertical => flags6 |= 1 << 0,
        Mirroring::FourScreen => flags6 |= 1 << 3,
        _ => {}
    }
    out[6] = flags6;

    // 7: NES 2.0 marker plus mapper mid nibble.
    let mut flags7 = 0b0000_1000u8;
    flags7 |= (mapper.kind.number() as u8) & 0b1111_0000;
    out[7] = flags7;

    // 8: mapper high nibble.
    out[8] = ((mapper.kind.number() >> 8) & 0b1111) as u8;

    // 9: PRG and CHR bank count high nibbles.
    if (mapper.num_16k_banks() >> 8) > 0b1111 {
        return Err(CompileError::new(None, "too many ROM banks"));
    }
    if (mapper.num_8k_chr_rom >> 8) > 0b1111 {
        return Err(CompileError::new(None, "too many CHR ROM banks"));
    }
    let mut hi = 0u8;
    hi |= ((mapper.num_16k_banks() >> 8) & 0b1111) as u8;
    hi |= ((mapper.num_8k_chr_rom >> 4) & 0b1111_0000) as u8;
    out[9] = hi;

    out[10] = 0;

    // 11: CHR RAM size as a shift count; size = 64 << shift.
    let chr_ram_chunks = mapper.num_8k_chr_ram * 0x2000 / 64;
    if chr_ram_chunks != 0 && !chr_ram_chunks.is_power_of_two() {
        return Err(CompileError::new(None, "invalid CHR RAM size"));
    }
    let chr_shift = if chr_ram_chunks == 0 { 0 } else { chr_ram_chunks.trailing_zeros() };
    debug_assert!(
        chr_ram_chunks == 0 || 64u32 << chr_shift == mapper.num_8k_chr_ram * 0x2000
    );
    if chr_shift > 0b1111 {
        return Err(CompileError::new(None, "CHR RAM is too large"));
    }
    out[11] = chr_shift as u8 & 0b1111;

    out[12] = 0;
    out[13] = 0;
    out[14] = 0;
    out[15] = 0;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nrom_header_bytes() {
        let params = MapperParams {
            mirroring: Some(Mirroring::Horizontal),
            prg_size: 32,
            chr_size: 8,
        };
        let mapper = Mapper::new(MapperKind::Nrom, &params).unwrap();
        let mut out = [0u8; 16];
        write_ines_header(&mut out, &mapper).unwrap();
        assert_eq!(
            out,
            [0x4E, 0x45, 0x53, 0x1A, 0x02, 0x01, 0x00, 0x08, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn vertical_mirroring_sets_bit_zero() {
        let params = MapperParams {
            mirroring: Some(Mirroring::Vertical),
            prg_size: 32,
            chr_size: 8,
        };
        let mapper = Mapper::new(MapperKind::Nrom, &params).unwrap();
        let mut out = [0u8; 16];
        write_ines_header(&mut out, &mapper).unwrap();
        assert_eq!(out[6], 0x01);
    }

    #[test]
    fn mapper_number_lands_in_nibbles() {
        let params = MapperParams { mirroring: None, prg_size: 0, chr_size: 0 };
        let mapper = Mapper::new(MapperKind::Gtrom, &params).unwrap();
        let mut out = [0u8; 16];
        write_ines_header(&mut out, &mapper).unwrap();
        // 111 = 0x6F: low nibble F in byte 6, mid nibble 6 in byte 7.
        assert_eq!(out[6] & 0xF0, 0xF0);
        assert_eq!(out[7] & 0xF0, 0x60);
        assert_eq!(out[8], 0);
        // Four-screen mirroring.
        assert_eq!(out[6] & 0b1000, 0b1000);
        // 8 KiB of CHR RAM: 64 << 7.
        assert_eq!(out[11], 7);
    }

    #[test]
    fn defaults_and_validation() {
        let defaults = MapperParams::default();
        let nrom = Mapper::new(MapperKind::Nrom, &defaults).unwrap();
        assert_eq!(nrom.num_32k_banks, 1);
        assert_eq!(nrom.num_8k_chr_rom, 1);
        assert_eq!(nrom.mirroring, Mirroring::Vertical);

        // NROM accepts only 32 KiB of PRG.
        let too_big = MapperParams { prg_size: 64, ..defaults };
        assert!(Mapper::new(MapperKind::Nrom, &too_big).is_err());

        // BNROM scales to 64 banks.
        let big = MapperParams { prg_size: 64 * 32, ..defaults };
        assert_eq!(Mapper::new(MapperKind::Bnrom, &big).unwrap().num_32k_banks, 64);

        // Sizes must be bank multiples.
        let ragged = MapperParams { prg_size: 48, ..defaults };
        assert!(Mapper::new(MapperKind::Bnrom, &ragged).is_err());

        // ANROM takes no nametable mirroring.
        let h = MapperParams { mirroring: Some(Mirroring::Horizontal), ..defaults };
        assert!(Mapper::new(MapperKind::Anrom, &h).is_err());
        assert!(Mapper::new(MapperKind::Gtrom, &h).is_err());

        // CNROM allows large CHR.
        let chr = MapperParams { chr_size: 256 * 8, ..defaults };
        assert_eq!(Mapper::new(MapperKind::Cnrom, &chr).unwrap().num_8k_chr_rom, 256);
    }
}

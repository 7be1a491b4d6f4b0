use std::io::Write;

/// One line of the output catalog.
pub struct CatalogRow {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub flux: f64,
    pub fluxerr: f64,
    /// AUTO aperture size (auto_scale * kron radius), in elliptical radii.
    pub kron_aper: f64,
    pub flux_auto: f64,
    pub fluxerr_auto: f64,
    pub flags: u16,
}

/// Write the whitespace-separated text catalog with `#` header lines.
pub fn write_catalog<W: Write>(out: &mut W, rows: &[CatalogRow]) -> std::io::Result<()> {
    writeln!(out, "# pleiades catalog")?;
    writeln!(out, "# 1 NUMBER")?;
    writeln!(out, "# 2 X_IMAGE (0-indexed)")?;
    writeln!(out, "# 3 Y_IMAGE (0-indexed)")?;
    writeln!(out, "# 4 FLUX")?;
    writeln!(out, "# 5 FLUXERR")?;
    writeln!(out, "# 6 KRON_RADIUS")?;
    writeln!(out, "# 7 FLUX_AUTO")?;
    writeln!(out, "# 8 FLUXERR_AUTO")?;
    writeln!(out, "# 9 FLAGS")?;
    for r in rows {
        writeln!(
            out,
            "{:3} {:11.4} {:11.4} {:12.4} {:11.4} {:11.4} {:12.4} {:11.4} {}",
            r.index,
            r.x,
            r.y,
            r.flux,
            r.fluxerr,
            r.kron_aper,
            r.flux_auto,
            r.fluxerr_auto,
            r.flags
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_format() {
        let rows = vec![CatalogRow {
            index: 0,
            x: 12.5,
            y: 30.25,
            flux: 1234.5,
            fluxerr: 10.0,
            kron_aper: 7.5,
            flux_auto: 1300.0,
            fluxerr_auto: 12.0,
            flags: 3,
        }];
        let mut buf = Vec::new();
        write_catalog(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let headers = text.lines().filter(|l| l.starts_with('#')).count();
        assert_eq!(headers, 10);
        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(data.len(), 1);
        let cols: Vec<&str> = data[0].split_whitespace().collect();
        assert_eq!(cols.len(), 9);
        assert_eq!(cols[0], "0");
        assert_eq!(cols[8], "3");
    }
}

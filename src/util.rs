use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Parses a `"x,y"` distance row as the host formats it for the network.
pub fn parse_pair(input: &str) -> Result<(f64, f64)> {
    let (x, y) = input
        .split_once(',')
        .ok_or_else(|| anyhow!("expected 'x,y', got '{input}'"))?;
    let x = x
        .trim()
        .parse::<f64>()
        .with_context(|| format!("invalid x in '{input}'"))?;
    let y = y
        .trim()
        .parse::<f64>()
        .with_context(|| format!("invalid y in '{input}'"))?;
    Ok((x, y))
}

pub fn parse_path_csv(input: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        paths.push(PathBuf::from(token));
    }
    if paths.is_empty() {
        return Err(anyhow!("no paths parsed from --traces"));
    }
    Ok(paths)
}

/// Lists `.csv` traces in a directory, sorted by path.
pub fn trace_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed listing {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed listing {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(anyhow!("no .csv traces in {}", dir.display()));
    }
    paths.sort();
    Ok(paths)
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_accepts_host_rows() {
        assert_eq!(parse_pair("12.5,-300").unwrap(), (12.5, -300.0));
        assert_eq!(parse_pair(" 0 , 250 ").unwrap(), (0.0, 250.0));
        assert!(parse_pair("12.5").is_err());
        assert!(parse_pair("a,1").is_err());
    }

    #[test]
    fn parse_path_csv_skips_blanks() {
        let paths = parse_path_csv("a.csv, ,b.csv,").unwrap();
        assert_eq!(paths, vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]);
        assert!(parse_path_csv(" , ").is_err());
    }
}

use std::path::Path;

use anyhow::Context;

/// Reads `key` from a `.env` style file without touching the process
/// environment. Missing files, missing keys and empty values all read as
/// `None`.
pub fn read_key_value(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed reading {}", path.display()));
        }
    };
    for entry in entries {
        let (name, value) = entry.with_context(|| format!("failed parsing {}", path.display()))?;
        if name == key {
            return Ok(Some(value).filter(|value| !value.is_empty()));
        }
    }
    Ok(None)
}

/// Sets `key` to `value`, replacing the first existing line for that key in
/// place or appending a new line. All other lines are preserved verbatim.
pub fn write_key_value(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed reading {}", path.display()));
        }
    };

    let entry = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            if !replaced && line_key(line) == Some(key) {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(path, body).with_context(|| format!("failed writing {}", path.display()))
}

/// Name assigned on an `[export ]KEY=value` line; comments and blanks have none.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    trimmed.split_once('=').map(|(name, _)| name.trim())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn read_tolerates_quotes_comments_and_export() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        fs::write(
            &path,
            "# secrets\nOTHER=1\nexport GEMINI_API_KEY=\"abc123\"\nSINGLE='x y'\n",
        )?;
        assert_eq!(read_key_value(&path, "GEMINI_API_KEY")?, Some("abc123".to_string()));
        assert_eq!(read_key_value(&path, "SINGLE")?, Some("x y".to_string()));
        assert_eq!(read_key_value(&path, "MISSING")?, None);
        assert_eq!(std::env::var("SINGLE").ok(), None);
        Ok(())
    }

    #[test]
    fn write_recognizes_exported_key_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        fs::write(&path, "export GEMINI_API_KEY=\"old\"\n# GEMINI_API_KEY=commented\n")?;

        write_key_value(&path, "GEMINI_API_KEY", "new")?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "GEMINI_API_KEY=new\n# GEMINI_API_KEY=commented\n"
        );
        assert_eq!(read_key_value(&path, "GEMINI_API_KEY")?, Some("new".to_string()));
        Ok(())
    }

    #[test]
    fn missing_file_and_empty_value_read_as_none() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        assert_eq!(read_key_value(&path, "GEMINI_API_KEY")?, None);
        fs::write(&path, "GEMINI_API_KEY=\"\"\n")?;
        assert_eq!(read_key_value(&path, "GEMINI_API_KEY")?, None);
        Ok(())
    }

    #[test]
    fn write_replaces_in_place_and_preserves_other_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        fs::write(&path, "# header\nA=1\nGEMINI_API_KEY=old\nB=2\n")?;

        write_key_value(&path, "GEMINI_API_KEY", "new")?;
        assert_eq!(
            fs::read_to_string(&path)?,
            "# header\nA=1\nGEMINI_API_KEY=new\nB=2\n"
        );
        Ok(())
    }

    #[test]
    fn write_appends_and_creates_parent_dirs() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join(".env");
        write_key_value(&path, "GEMINI_API_KEY", "k1")?;
        write_key_value(&path, "OTHER", "v")?;
        assert_eq!(fs::read_to_string(&path)?, "GEMINI_API_KEY=k1\nOTHER=v\n");
        assert_eq!(read_key_value(&path, "OTHER")?, Some("v".to_string()));
        Ok(())
    }
}

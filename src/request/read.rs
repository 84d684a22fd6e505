use std::{fs, io};
use std::io::Error;
use std::path::{Path, PathBuf};

/// Suffix given to manifests once their job has been handed out
pub static TAKEN_SUFFIX: &str = "taken";

/// JSON manifests in `dir` that haven't been handed out yet, in file name order
pub fn get_message_paths(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut paths = fs::read_dir(dir)?
        .map(|res| res.map(|e| e.path()))
        .collect::<Result<Vec<PathBuf>, io::Error>>()?;
    paths.retain(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "json"));
    paths.sort();
    Ok(paths)
}

/// Mark a manifest as handed out so a restarted run doesn't generate its job again
pub fn mark_taken(path: &Path) -> Result<PathBuf, Error> {
    let mut taken = path.as_os_str().to_owned();
    taken.push(".");
    taken.push(TAKEN_SUFFIX);
    let taken = PathBuf::from(taken);
    fs::rename(path, &taken)?;
    Ok(taken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_untaken_json_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json", "notes.txt", "c.json"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        fs::create_dir(dir.path().join("d.json")).unwrap();
        mark_taken(&dir.path().join("c.json")).unwrap();

        let names: Vec<String> = get_message_paths(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
        assert!(dir.path().join("c.json.taken").exists());
    }
}

//! Submission files bundled into one zip archive for download.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::api::{ApiError, CachedClient, Submission};

/// Zip `files` in order. Entry names are reduced to their last path
/// component and made unique, so no entry can escape the extraction folder.
pub fn zip_files(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
  let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
  let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
  let mut used = HashSet::new();

  for (name, bytes) in files {
    let entry = entry_name(&mut used, name);
    writer
      .start_file(entry.as_str(), options)
      .map_err(|e| eyre!("Failed to add {} to archive: {}", entry, e))?;
    writer.write_all(bytes)?;
  }

  let cursor = writer
    .finish()
    .map_err(|e| eyre!("Failed to finish archive: {}", e))?;
  Ok(cursor.into_inner())
}

fn entry_name(used: &mut HashSet<String>, name: &str) -> String {
  let base = Path::new(name)
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .filter(|n| !n.is_empty())
    .unwrap_or_else(|| "file".to_string());

  if used.insert(base.clone()) {
    return base;
  }

  let path = Path::new(&base);
  let stem = path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| base.clone());
  let ext = path
    .extension()
    .map(|e| format!(".{}", e.to_string_lossy()))
    .unwrap_or_default();

  (2..)
    .map(|n| format!("{} ({}){}", stem, n, ext))
    .find(|candidate| used.insert(candidate.clone()))
    .unwrap_or(base)
}

/// `submission-12-ada-byron.zip`
pub fn archive_name(submission: &Submission) -> String {
  let student: String = submission
    .student_name
    .to_lowercase()
    .chars()
    .map(|c| if c.is_alphanumeric() { c } else { '-' })
    .collect();
  let student = student
    .split('-')
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("-");

  if student.is_empty() {
    format!("submission-{}.zip", submission.id)
  } else {
    format!("submission-{}-{}.zip", submission.id, student)
  }
}

/// Where archives are saved: the user's download folder, else home.
pub fn download_dir() -> PathBuf {
  dirs::download_dir()
    .or_else(dirs::home_dir)
    .unwrap_or_else(|| PathBuf::from("."))
}

/// Fetch every file of `submission` and write them as one archive in `dir`.
pub async fn save_submission(
  client: &CachedClient,
  submission: &Submission,
  dir: &Path,
) -> Result<PathBuf, ApiError> {
  let files = client.download_files(submission).await?;
  let dest = dir.join(archive_name(submission));

  let archive = zip_files(&files).map_err(|e| ApiError::Attachment {
    path: dest.display().to_string(),
    message: e.to_string(),
  })?;
  tokio::fs::write(&dest, &archive)
    .await
    .map_err(|e| ApiError::attachment(&dest, e))?;

  info!(
    submission = submission.id,
    files = files.len(),
    bytes = archive.len(),
    path = %dest.display(),
    "saved submission archive"
  );
  Ok(dest)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use std::io::Read;
  use zip::ZipArchive;

  fn entries(archive: Vec<u8>) -> Vec<(String, String)> {
    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    (0..archive.len())
      .map(|i| {
        let mut file = archive.by_index(i).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        (file.name().to_string(), content)
      })
      .collect()
  }

  fn submission(student: &str) -> Submission {
    Submission {
      id: 12,
      assignment_id: 5,
      student_id: 3,
      student_name: student.to_string(),
      submitted_at: Utc::now(),
      grade: None,
      files: Vec::new(),
    }
  }

  #[test]
  fn test_zip_keeps_files_in_order() {
    let archive = zip_files(&[
      ("report.pdf".to_string(), b"%PDF".to_vec()),
      ("main.rs".to_string(), b"fn main() {}".to_vec()),
    ])
    .unwrap();

    assert_eq!(
      entries(archive),
      vec![
        ("report.pdf".to_string(), "%PDF".to_string()),
        ("main.rs".to_string(), "fn main() {}".to_string()),
      ]
    );
  }

  #[test]
  fn test_duplicate_names_are_numbered() {
    let archive = zip_files(&[
      ("notes.txt".to_string(), b"a".to_vec()),
      ("notes.txt".to_string(), b"b".to_vec()),
      ("notes.txt".to_string(), b"c".to_vec()),
      ("Makefile".to_string(), b"d".to_vec()),
      ("Makefile".to_string(), b"e".to_vec()),
    ])
    .unwrap();

    let names: Vec<String> = entries(archive).into_iter().map(|(n, _)| n).collect();
    assert_eq!(
      names,
      vec!["notes.txt", "notes (2).txt", "notes (3).txt", "Makefile", "Makefile (2)"]
    );
  }

  #[test]
  fn test_paths_are_flattened() {
    let archive = zip_files(&[
      ("../../etc/passwd".to_string(), b"x".to_vec()),
      ("src/lib.rs".to_string(), b"y".to_vec()),
      ("..".to_string(), b"z".to_vec()),
    ])
    .unwrap();

    let names: Vec<String> = entries(archive).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["passwd", "lib.rs", "file"]);
  }

  #[test]
  fn test_empty_bundle_is_a_valid_archive() {
    let archive = zip_files(&[]).unwrap();
    assert!(entries(archive).is_empty());
  }

  #[test]
  fn test_archive_name() {
    assert_eq!(archive_name(&submission("Ada  Byron")), "submission-12-ada-byron.zip");
    assert_eq!(archive_name(&submission("José Núñez")), "submission-12-josé-núñez.zip");
    assert_eq!(archive_name(&submission("  ")), "submission-12.zip");
  }
}

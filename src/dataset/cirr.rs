//! CIRR splits: `cirr_dataset/cirr/{captions,image_splits}` under the data root.

use super::{read_json, ClassicItem, Query};
use crate::error::{CirevalError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DATASET_DIR: &str = "cirr_dataset";
const RELEASE: &str = "rc2";

#[derive(Debug, Deserialize)]
struct CaptionEntry {
    reference: String,
    target_hard: String,
    caption: String,
    img_set: ImageSet,
}

#[derive(Debug, Deserialize)]
struct ImageSet {
    members: Vec<String>,
}

fn base(root: &Path) -> PathBuf {
    root.join(DATASET_DIR)
}

fn captions_path(root: &Path, split: &str) -> PathBuf {
    base(root)
        .join("cirr")
        .join("captions")
        .join(format!("cap.{}.{}.json", RELEASE, split))
}

fn image_split_path(root: &Path, split: &str) -> PathBuf {
    base(root)
        .join("cirr")
        .join("image_splits")
        .join(format!("split.{}.{}.json", RELEASE, split))
}

/// Index images in the split file's order (name -> path relative to `cirr_dataset/`).
pub fn load_classic(root: &Path, split: &str) -> Result<Vec<ClassicItem>> {
    let path = image_split_path(root, split);
    let name_to_path: serde_json::Map<String, serde_json::Value> = read_json(&path)?;

    let mut items = Vec::with_capacity(name_to_path.len());
    for (name, relative) in name_to_path {
        let relative = relative.as_str().ok_or_else(|| {
            CirevalError::Dataset(format!(
                "{}: image path for {} is not a string",
                path.display(),
                name
            ))
        })?;
        items.push(ClassicItem {
            image_path: base(root).join(relative.trim_start_matches("./")),
            name,
        });
    }

    log::info!("CIRR {} index: {} images", split, items.len());
    Ok(items)
}

/// Query triplets with their closed candidate groups, in file order.
pub fn load_relative(root: &Path, split: &str) -> Result<Vec<Query>> {
    let entries: Vec<CaptionEntry> = read_json(&captions_path(root, split))?;
    let queries: Vec<Query> = entries
        .into_iter()
        .map(|entry| Query {
            reference: entry.reference,
            target: entry.target_hard,
            captions: vec![entry.caption],
            group: Some(entry.img_set.members),
        })
        .collect();
    log::info!("CIRR {} queries: {}", split, queries.len());
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(root: &Path) {
        let cirr = base(root).join("cirr");
        fs::create_dir_all(cirr.join("captions")).unwrap();
        fs::create_dir_all(cirr.join("image_splits")).unwrap();
        fs::write(
            cirr.join("captions").join("cap.rc2.val.json"),
            r#"[{
                "pairid": 0,
                "reference": "dev-0-img0",
                "target_hard": "dev-0-img2",
                "target_soft": {"dev-0-img2": 1.0},
                "caption": "Show two dogs instead of one",
                "img_set": {"id": 0, "members": ["dev-0-img0", "dev-0-img1", "dev-0-img2"]}
            }]"#,
        )
        .unwrap();
        // Deliberately not alphabetical: file order must survive
        fs::write(
            cirr.join("image_splits").join("split.rc2.val.json"),
            r#"{"dev-0-img2": "./dev/dev-0-img2.png", "dev-0-img0": "./dev/dev-0-img0.png", "dev-0-img1": "./dev/dev-0-img1.png"}"#,
        )
        .unwrap();
    }

    #[test]
    fn load_classic_preserves_file_order() {
        let temp_dir = TempDir::new().unwrap();
        write_fixture(temp_dir.path());

        let items = load_classic(temp_dir.path(), "val").unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["dev-0-img2", "dev-0-img0", "dev-0-img1"]);
        assert!(items[0].image_path.ends_with("cirr_dataset/dev/dev-0-img2.png"));
    }

    #[test]
    fn load_relative_reads_groups() {
        let temp_dir = TempDir::new().unwrap();
        write_fixture(temp_dir.path());

        let queries = load_relative(temp_dir.path(), "val").unwrap();
        assert_eq!(queries.len(), 1);
        let query = &queries[0];
        assert_eq!(query.reference, "dev-0-img0");
        assert_eq!(query.target, "dev-0-img2");
        assert_eq!(query.fusion_text(), "Show two dogs instead of one");
        assert_eq!(query.group.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn non_string_image_path_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let splits = base(temp_dir.path()).join("cirr").join("image_splits");
        fs::create_dir_all(&splits).unwrap();
        fs::write(splits.join("split.rc2.val.json"), r#"{"dev-0-img0": 3}"#).unwrap();

        let err = load_classic(temp_dir.path(), "val").unwrap_err();
        assert!(matches!(err, CirevalError::Dataset(_)));
    }
}

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{Item, PaperId};
use crate::error::WatchError;

const MAX_FOLDER_CHARS: usize = 50;
const MAX_TITLE_CHARS: usize = 100;

const CURATED_FOLDERS: &[(&str, &str)] = &[
    ("cat:cs.AI", "Artificial_Intelligence"),
    ("cat:cs.LG", "Machine_Learning"),
    ("cat:cs.CV", "Computer_Vision"),
    ("cat:cs.CL", "Computation_and_Language"),
    ("cat:cs.RO", "Robotics"),
    ("cat:cs.NE", "Neural_and_Evolutionary_Computing"),
    ("cat:stat.ML", "Statistical_Machine_Learning"),
];

pub fn resolve(query: &str) -> String {
    if let Some((_, folder)) = CURATED_FOLDERS.iter().find(|(key, _)| *key == query) {
        return (*folder).to_string();
    }

    let stem = sanitize(query, '_', MAX_FOLDER_CHARS);
    let stem = if stem.is_empty() { "unnamed" } else { &stem };
    if query.starts_with("cat:") {
        format!("category_{stem}")
    } else {
        format!("keywords_{stem}")
    }
}

pub fn ensure_directory(
    base: &Utf8Path,
    query: Option<&str>,
    organize_by_query: bool,
) -> Result<Utf8PathBuf, WatchError> {
    let target = match query {
        Some(query) if organize_by_query => base.join(resolve(query)),
        _ => base.to_path_buf(),
    };
    fs::create_dir_all(target.as_std_path())
        .map_err(|err| WatchError::Filesystem(format!("create {target}: {err}")))?;
    Ok(target)
}

pub fn asset_file_name(item: &Item) -> String {
    file_name_for(&item.id, &item.title, item.asset_kind().extension())
}

pub fn file_name_for(id: &PaperId, title: &str, extension: &str) -> String {
    let slug = sanitize(title, '-', MAX_TITLE_CHARS);
    if slug.is_empty() {
        format!("{}.{extension}", id.file_stem())
    } else {
        format!("{}_{slug}.{extension}", id.file_stem())
    }
}

fn sanitize(value: &str, separator: char, max_chars: usize) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for ch in value.chars() {
        if ch.is_whitespace() || ch == '-' {
            if !in_run {
                out.push(separator);
                in_run = true;
            }
        } else if ch.is_alphanumeric() {
            out.push(ch);
            in_run = false;
        }
    }
    let truncated: String = out.chars().take(max_chars).collect();
    truncated.trim_matches(separator).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_category() {
        assert_eq!(resolve("cat:cs.LG"), "Machine_Learning");
    }

    #[test]
    fn keyword_query() {
        assert_eq!(resolve("large language model"), "keywords_large_language_model");
        assert_eq!(resolve("  self-supervised -- learning "), "keywords_self_supervised_learning");
    }

    #[test]
    fn uncurated_category() {
        assert_eq!(resolve("cat:math.AG"), "category_catmathAG");
    }

    #[test]
    fn long_query_is_truncated() {
        let query = "a".repeat(80);
        let folder = resolve(&query);
        assert_eq!(folder, format!("keywords_{}", "a".repeat(50)));
    }

    #[test]
    fn punctuation_only_query() {
        assert_eq!(resolve("?!"), "keywords_unnamed");
    }

    #[test]
    fn title_slug() {
        let id: PaperId = "2301.00001".parse().unwrap();
        assert_eq!(
            file_name_for(&id, "Attention: Is It (Really) All You Need?", "pdf"),
            "2301.00001_Attention-Is-It-Really-All-You-Need.pdf"
        );
        assert_eq!(file_name_for(&id, "???", "pdf"), "2301.00001.pdf");
    }
}

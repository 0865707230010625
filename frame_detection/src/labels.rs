use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Class index to name table shared by every result of one loaded model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassNames {
    names: HashMap<usize, String>,
}

impl ClassNames {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(index, name)| (index, name.into()))
                .collect(),
        }
    }

    pub fn from_map(names: HashMap<usize, String>) -> Self {
        Self { names }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    pub fn resolve(&self, index: usize) -> String {
        match self.get(index) {
            Some(name) => name.to_string(),
            None => format!("Unknown class {}", index),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Reads one class per non-empty line. Anything after the first comma is
/// ignored, so `label,r,g,b` colour files load as well.
pub fn load_labels(filepath: &Path) -> io::Result<ClassNames> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.split(',').next().unwrap_or_default().trim();
        if label.is_empty() {
            continue;
        }
        labels.push(label.to_string());
    }

    if labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No labels found in {:?}", filepath),
        ));
    }

    Ok(ClassNames::from_names(labels))
}

/// Parses the `names` entry Ultralytics writes into exported ONNX metadata,
/// a Python dict literal such as `{0: 'person', 1: 'bicycle'}`.
pub fn parse_names_metadata(raw: &str) -> Option<ClassNames> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut names = HashMap::new();
    let mut rest = body.trim_start();

    while !rest.is_empty() {
        let (index, after_index) = rest.split_once(':')?;
        let index: usize = index.trim().parse().ok()?;

        let after_index = after_index.trim_start();
        let quote = after_index.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let value = &after_index[quote.len_utf8()..];
        let end = value.find(quote)?;
        names.insert(index, value[..end].to_string());

        rest = value[end + quote.len_utf8()..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    if names.is_empty() {
        return None;
    }
    Some(ClassNames::from_map(names))
}

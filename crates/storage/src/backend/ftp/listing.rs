//! Parsers for `MLSD` facts and the two `LIST` dialects seen in the wild
//! (Unix `ls -l` and IIS/DOS).
//!
//! Unparseable lines, symlinks, `.` and `..` are skipped rather than failing
//! the whole listing.

use crate::models::NodeKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: Option<u64>,
    /// Raw server timestamp, compared verbatim between scans.
    pub modified: Option<String>,
}

fn is_special(name: &str) -> bool {
    name.is_empty() || name == "." || name == ".."
}

pub(crate) fn parse_mlsd(raw: &str) -> Vec<ListEntry> {
    raw.lines().filter_map(parse_mlsd_line).collect()
}

/// `type=file;size=1024;modify=20240101120000; name with spaces.tif`
fn parse_mlsd_line(line: &str) -> Option<ListEntry> {
    let (facts, name) = line.trim_end_matches('\r').split_once(' ')?;
    if is_special(name) {
        return None;
    }
    let (mut kind, mut size, mut modified) = (None, None, None);
    for (key, value) in facts.split(';').filter_map(|fact| fact.split_once('=')) {
        match key.to_ascii_lowercase().as_str() {
            // cdir, pdir and OS-specific types (symlinks) are skipped.
            "type" => {
                kind = match value.to_ascii_lowercase().as_str() {
                    "file" => Some(NodeKind::File),
                    "dir" => Some(NodeKind::Directory),
                    _ => None,
                }
            },
            "size" => size = value.parse().ok(),
            "modify" => modified = Some(value.to_string()),
            _ => {},
        }
    }
    let kind = kind?;
    Some(ListEntry {
        name: name.to_string(),
        kind,
        size: if kind == NodeKind::File { size } else { None },
        modified: if kind == NodeKind::File { modified } else { None },
    })
}

pub(crate) fn parse_list(raw: &str) -> Vec<ListEntry> {
    raw.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| parse_unix_line(line).or_else(|| parse_dos_line(line)))
        .filter(|entry| !is_special(&entry.name))
        .collect()
}

/// First `count` whitespace-separated fields, plus everything after them
/// (file names may contain spaces).
fn split_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start();
    while fields.len() < count {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((fields, rest))
}

/// `-rw-r--r--   1 owner group   1024 Jan 01 12:00 name`; some servers omit
/// the group column.
fn parse_unix_line(line: &str) -> Option<ListEntry> {
    let kind = match line.as_bytes().first()? {
        b'-' => NodeKind::File,
        b'd' => NodeKind::Directory,
        _ => return None,
    };
    let with_group = split_fields(line, 8)
        .filter(|(fields, name)| !name.is_empty() && fields[4].bytes().all(|b| b.is_ascii_digit()));
    let (size, date, name) = match with_group {
        Some((fields, name)) => (fields[4].parse::<u64>().ok()?, fields[5..8].join(" "), name),
        None => {
            let (fields, name) = split_fields(line, 7)?;
            (fields[3].parse::<u64>().ok()?, fields[4..7].join(" "), name)
        },
    };
    Some(ListEntry {
        name: name.to_string(),
        kind,
        size: if kind == NodeKind::File { Some(size) } else { None },
        modified: if kind == NodeKind::File { Some(date) } else { None },
    })
}

/// `01-15-24  03:04PM       <DIR>          name`
fn parse_dos_line(line: &str) -> Option<ListEntry> {
    let (fields, name) = split_fields(line, 3)?;
    let looks_like_date = fields[0].contains('-') && fields[0].bytes().all(|b| b.is_ascii_digit() || b == b'-');
    if !looks_like_date || name.is_empty() {
        return None;
    }
    let (kind, size) = match fields[2] {
        "<DIR>" => (NodeKind::Directory, None),
        size => (NodeKind::File, Some(size.parse::<u64>().ok()?)),
    };
    Some(ListEntry {
        name: name.to_string(),
        kind,
        size,
        modified: (kind == NodeKind::File).then(|| format!("{} {}", fields[0], fields[1])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_mlsd() {
        let raw = "type=cdir;modify=20240101000000; .\r\n\
                   type=pdir;modify=20240101000000; ..\r\n\
                   type=dir;modify=20240101000000; scenes\r\n\
                   type=file;size=2048;modify=20240102030405;UNIX.mode=0644; tile 01.tif\r\n\
                   type=OS.unix=symlink;modify=20240101000000; latest\r\n";
        assert_eq!(
            parse_mlsd(raw),
            vec![
                ListEntry {
                    name: "scenes".into(),
                    kind: NodeKind::Directory,
                    size: None,
                    modified: None,
                },
                ListEntry {
                    name: "tile 01.tif".into(),
                    kind: NodeKind::File,
                    size: Some(2048),
                    modified: Some("20240102030405".into()),
                },
            ]
        );
    }

    #[rstest]
    #[case("-rw-r--r--    1 ftp      ftp        123456 Mar 14  2023 dem.tif", "dem.tif", NodeKind::File, Some(123456), Some("Mar 14 2023"))]
    #[case("-rw-r--r--    1 ftp      ftp            42 Jan 01 12:00 with  two spaces.jp2", "with  two spaces.jp2", NodeKind::File, Some(42), Some("Jan 01 12:00"))]
    #[case("drwxr-xr-x    2 ftp      ftp          4096 Jan 01 12:00 ortho", "ortho", NodeKind::Directory, None, None)]
    #[case("-rw-r--r--  1 owner  77 Feb  2 10:10 nogroup.tiff", "nogroup.tiff", NodeKind::File, Some(77), Some("Feb 2 10:10"))]
    #[case("01-15-24  03:04PM       <DIR>          Imagery", "Imagery", NodeKind::Directory, None, None)]
    #[case("01-15-24  03:04PM              1024 scene.TIF", "scene.TIF", NodeKind::File, Some(1024), Some("01-15-24 03:04PM"))]
    fn test_parse_list_line(
        #[case] line: &str,
        #[case] name: &str,
        #[case] kind: NodeKind,
        #[case] size: Option<u64>,
        #[case] modified: Option<&str>,
    ) {
        let entries = parse_list(line);
        assert_eq!(entries.len(), 1, "{line}");
        assert_eq!(entries[0].name, name);
        assert_eq!(entries[0].kind, kind);
        assert_eq!(entries[0].size, size);
        assert_eq!(entries[0].modified.as_deref(), modified);
    }

    #[rstest]
    #[case("total 24")]
    #[case("lrwxrwxrwx    1 ftp      ftp            10 Jan 01 12:00 link -> target")]
    #[case("drwxr-xr-x    2 ftp      ftp          4096 Jan 01 12:00 .")]
    #[case("drwxr-xr-x    2 ftp      ftp          4096 Jan 01 12:00 ..")]
    #[case("")]
    fn test_parse_list_skips(#[case] line: &str) {
        assert!(parse_list(line).is_empty());
    }
}

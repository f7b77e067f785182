use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)(\d+)$").expect("static regex"));

/// Width of the suffix synthesized for stems without trailing digits.
const DEFAULT_WIDTH: usize = 4;

/// Split `name` into stem and extension the way most tools do:
/// the extension starts at the last `.` that is not part of a leading
/// run of dots (`.bashrc` has no extension, `a.tar.gz` has `.gz`).
pub fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if name[..i].chars().any(|c| c != '.') => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Parsed numbering scheme of a file stem.
struct Scheme<'a> {
    prefix: String,
    ext: &'a str,
    next: u64,
    width: usize,
}

impl<'a> Scheme<'a> {
    fn of(file_name: &'a str) -> Self {
        let (stem, ext) = split_ext(file_name);
        if let Some(caps) = TRAILING_DIGITS.captures(stem) {
            let digits = &caps[2];
            if let Some(next) = digits.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
                return Scheme {
                    prefix: caps[1].to_string(),
                    ext,
                    next,
                    width: digits.len(),
                };
            }
        }
        Scheme {
            prefix: format!("{stem}_"),
            ext,
            next: 1,
            width: DEFAULT_WIDTH,
        }
    }

    fn name(&self, n: u64) -> String {
        format!("{}{:0width$}{}", self.prefix, n, self.ext, width = self.width)
    }
}

/// Lowest-numbered sibling of `file_name` that does not exist in `dir`.
///
/// `img_0007.png` probes `img_0008.png`, `img_0009.png`, ...;
/// `img.png` probes `img_0001.png`, ... The requested name itself is never
/// returned. Dangling symlinks count as taken.
pub fn next_free_name(dir: &Path, file_name: &str) -> String {
    let scheme = Scheme::of(file_name);
    let mut n = scheme.next;
    loop {
        let candidate = scheme.name(n);
        if fs::symlink_metadata(dir.join(&candidate)).is_err() {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

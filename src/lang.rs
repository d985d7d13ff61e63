/// File extensions (without the dot) for a language name or alias.
pub fn language_extensions(lang: &str) -> Option<&'static [&'static str]> {
    let exts: &'static [&'static str] = match lang.trim().to_ascii_lowercase().as_str() {
        "rust" | "rs" => &["rs"],
        "go" | "golang" => &["go"],
        "python" | "py" => &["py", "pyi", "pyw"],
        "typescript" | "ts" => &["ts", "tsx", "mts", "cts"],
        "javascript" | "js" => &["js", "jsx", "mjs", "cjs"],
        "java" => &["java"],
        "kotlin" | "kt" => &["kt", "kts"],
        "c" => &["c", "h"],
        "c++" | "cpp" | "cxx" => &["cc", "cpp", "cxx", "hpp", "hh", "hxx", "inl", "h"],
        "objective-c" | "objc" | "obj-c" => &["m", "mm", "h"],
        "swift" => &["swift"],
        "nix" => &["nix"],
        "protobuf" | "proto" | "protocol buffer" => &["proto"],
        "lua" => &["lua"],
        "php" => &["php", "phtml"],
        "glsl" => &["glsl", "vert", "frag", "geom", "comp"],
        "ruby" | "rb" => &["rb", "rake", "gemspec"],
        "shell" | "bash" | "sh" => &["sh", "bash", "zsh"],
        "markdown" | "md" => &["md", "markdown"],
        "yaml" | "yml" => &["yaml", "yml"],
        "toml" => &["toml"],
        "json" => &["json"],
        "sql" => &["sql"],
        _ => return None,
    };
    Some(exts)
}

/// Regular expression matching paths of files written in `lang`.
///
/// Unknown languages are treated as a bare extension.
pub fn lang_to_file_regex(lang: &str) -> String {
    match language_extensions(lang) {
        Some(exts) => {
            let alternatives = exts
                .iter()
                .map(|ext| regex::escape(ext))
                .collect::<Vec<_>>()
                .join("|");
            format!(r"\.({alternatives})$")
        }
        None => format!(r"\.{}$", regex::escape(lang.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_lists_extensions() {
        assert_eq!(lang_to_file_regex("Go"), r"\.(go)$");
        assert_eq!(lang_to_file_regex("ts"), r"\.(ts|tsx|mts|cts)$");
        assert_eq!(
            lang_to_file_regex("c++"),
            r"\.(cc|cpp|cxx|hpp|hh|hxx|inl|h)$"
        );
    }

    #[test]
    fn unknown_language_is_escaped() {
        assert_eq!(lang_to_file_regex("f#"), r"\.f\#$");
        assert!(regex::Regex::new(&lang_to_file_regex("weird.lang+")).is_ok());
    }
}

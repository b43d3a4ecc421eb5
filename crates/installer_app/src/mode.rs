use std::path::PathBuf;

/// The four ways the tool's command line can be interpreted, per original
/// spec §6. Classification only; the `FileChooser` case is handed to the
/// UI collaborator, which is out of scope here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliMode {
    Help,
    Guided { tp2: PathBuf },
    Custom { argv: Vec<String> },
    FileChooser,
}

/// Classifies `argv` (the program name already stripped) into a [`CliMode`].
pub fn classify(argv: &[String]) -> CliMode {
    if argv.is_empty() {
        return CliMode::FileChooser;
    }
    if argv.iter().any(|arg| arg == "--help" || arg == "-help") {
        return CliMode::Help;
    }
    let first = &argv[0];
    if !first.starts_with("--") && ends_with_tp2(first) {
        return CliMode::Guided {
            tp2: PathBuf::from(first),
        };
    }
    CliMode::Custom {
        argv: argv.to_vec(),
    }
}

fn ends_with_tp2(path: &str) -> bool {
    path.len() >= 4 && path[path.len() - 4..].eq_ignore_ascii_case(".tp2")
}

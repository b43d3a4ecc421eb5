use installer_session::Charset;

/// Fragment-to-codepage table used to guess plausible text encodings for a
/// language name returned by the installer's language list. Matching is a
/// case-insensitive substring test; UTF-8 is always tried first regardless
/// of the language string.
const FRAGMENT_TABLE: &[(&[&str], &[Charset])] = &[
    (
        &[
            "english",
            "american",
            "british",
            "french",
            "français",
            "francais",
            "german",
            "deutsch",
            "italian",
            "spanish",
            "castilian",
            "español",
            "espanol",
            "castellano",
            "portuguese",
            "brazilian",
            "portugués",
            "portugues",
            "brasil",
        ],
        &[Charset::Windows1252],
    ),
    (&["czech", "česky", "cesky", "polish", "polski"], &[Charset::Windows1250]),
    (
        &["russian", "russki", "русский"],
        &[Charset::Ibm866, Charset::Windows1251],
    ),
    (
        &["traditional chinese", "traditional", "繁體"],
        &[Charset::Big5],
    ),
    (
        &["simplified chinese", "simplified", "chinese", "简体", "中文"],
        &[Charset::Gbk],
    ),
    (
        &["japanese", "nihon", "日本語", "日本"],
        &[Charset::ShiftJis],
    ),
    (
        &["korean", "hangug", "한국"],
        &[Charset::Cp949, Charset::EucKr],
    ),
];

/// Returns the ordered list of charsets worth trying for `language`, UTF-8
/// always first, followed by whichever fragment table row matches a
/// substring of `language` (case-insensitive).
pub fn charset_candidates_for(language: &str) -> Vec<Charset> {
    let lowercase = language.to_lowercase();
    let mut candidates = vec![Charset::Utf8];
    for (fragments, charsets) in FRAGMENT_TABLE {
        if fragments.iter().any(|frag| lowercase.contains(frag)) {
            candidates.extend_from_slice(charsets);
            break;
        }
    }
    candidates
}

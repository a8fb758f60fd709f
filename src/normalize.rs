//! Text normalization and affix trimming shared by every matching stage.

use std::borrow::Cow;
use unicode_normalization::{is_nfkc_quick, IsNormalized, UnicodeNormalization};

/// Leading function words stripped from a sentence before it is used as a
/// matching key. Order matters: the first match wins.
pub const DEFAULT_PREFIXES: &[&str] = &[
    "徒觀其", "矞夫", "矞乃", "至夫", "懿夫", "蓋由我君", "重曰", "是知", "嗟夫", "夫其", "懿其", "所以",
    "想夫", "其始也", "當其", "況復", "時則", "至若", "豈獨", "若乃", "今則", "乃知", "既而", "嗟乎",
    "故我后", "觀夫", "然而", "爾乃", "是以", "原夫", "曷若", "斯則", "於時", "方今", "亦何必", "若然",
    "客有", "至於", "則知", "且夫", "斯乃", "況", "於是", "覩夫", "且彼", "豈若", "已而", "始也", "故",
    "然則", "豈如我", "豈不以", "我國家", "其工者", "所謂", "今吾君", "及夫", "爾其", "將以", "可以", "今",
    "國家", "然後", "向非我后", "則有", "彼", "惜乎", "由是", "乃言曰", "若夫", "亦何用", "不然",
    "嘉其", "今則", "徒美夫", "故能", "有探者曰", "惜如", "而況", "逮夫", "誠夫", "於戲", "洎乎", "伊昔",
    "則將", "今則", "況今", "士有", "暨乎", "亦何辨夫", "俾夫", "亦猶", "瞻夫", "時也", "固知", "足以",
    "矞國家", "比乎", "亦由", "觀其", "將俾乎", "聖人", "君子", "於以", "乃", "斯蓋", "噫", "夫惟",
    "高皇帝", "帝既", "嘉其", "始則", "又安得", "其", "儒有", "當是時也", "夫然", "宜乎", "故其", "國家",
    "爾其始也", "今我國家", "是時", "有司", "向若", "我皇", "故王者", "則", "鄒子", "孰", "暨夫", "用能",
    "故將", "況其", "故宜", "王者", "聖上", "先王", "乃有", "況乃", "別有", "今者", "固宜", "皇上", "且其",
    "徒觀夫", "帝堯以", "始其", "倏而", "乃曰", "向使", "漢武帝", "先是", "他日", "乃命", "觀乎", "國家以",
    "墨子", "借如", "足以", "上乃", "嗚呼", "昔伊", "先賢", "遂使", "豈比夫", "固其", "況有", "魯恭王", "皇家",
    "吾君是時", "知", "周穆王", "則有", "是用", "乃言曰", "及", "故夫", "矞乎", "夫以", "寧令", "如", "然則",
    "滅明乃", "遂", "悲夫", "安得", "故得", "且見其", "是何", "莫不", "士有", "知其", "未若", "蓋以", "固可以",
    "豈徒", "豈比夫", "是故",
];

/// Trailing particles stripped when no prefix applies.
pub const DEFAULT_SUFFIXES: &[&str] = &["曰", "哉", "矣", "也", "矣哉", "乎", "焉", "者也", "也矣哉"];

/// Apply Unicode compatibility normalization (NFKC).
///
/// Folds full-width and half-width forms and other compatibility variants
/// to one representation. Borrows when the input is already normalized.
pub fn normalize(text: &str) -> Cow<'_, str> {
    if is_nfkc_quick(text.chars()) == IsNormalized::Yes {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.nfkc().collect())
    }
}

/// Which affix rule fired during a trim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimRule {
    Prefix(usize),
    Suffix(usize),
}

/// First-match, single-application prefix/suffix trimmer.
///
/// Prefixes are tried in order and the first hit is removed. Suffixes are
/// only consulted when no prefix matched. At most one rule fires per call.
#[derive(Debug, Clone, Default)]
pub struct AffixTrimmer {
    prefixes: Vec<String>,
    suffixes: Vec<String>,
}

impl AffixTrimmer {
    /// Empty affixes are dropped; they would match every sentence.
    pub fn new(prefixes: Vec<String>, suffixes: Vec<String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().filter(|p| !p.is_empty()).collect(),
            suffixes: suffixes.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_PREFIXES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn trim<'a>(&self, text: &'a str) -> &'a str {
        self.trim_with_rule(text).0
    }

    /// Trim and report the rule that fired, if any.
    pub fn trim_with_rule<'a>(&self, text: &'a str) -> (&'a str, Option<TrimRule>) {
        for (i, prefix) in self.prefixes.iter().enumerate() {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                return (rest.trim(), Some(TrimRule::Prefix(i)));
            }
        }
        for (i, suffix) in self.suffixes.iter().enumerate() {
            if let Some(rest) = text.strip_suffix(suffix.as_str()) {
                return (rest.trim(), Some(TrimRule::Suffix(i)));
            }
        }
        (text.trim(), None)
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

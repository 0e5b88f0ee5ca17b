//! Test vectors: the embedded conversion table and YAML vector files

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Input length class as labelled in the vector table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    S,
    M,
    L,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::S => "S",
            SizeClass::M => "M",
            SizeClass::L => "L",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a vector's outcome is judged, derived from its identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorCategory {
    /// `Pos_...`: converted output is expected
    Positive,
    /// `Neg_...`: no converted output is expected
    Negative,
    /// `..._UI_...`: output must update while typing
    UiBehavior,
    Unrecognized,
}

impl VectorCategory {
    pub fn from_id(id: &str) -> Self {
        if id.contains("_UI_") {
            VectorCategory::UiBehavior
        } else if id.starts_with("Pos_") {
            VectorCategory::Positive
        } else if id.starts_with("Neg_") {
            VectorCategory::Negative
        } else {
            VectorCategory::Unrecognized
        }
    }
}

/// One immutable test vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    pub id: String,
    pub name: String,
    #[serde(rename = "size")]
    pub size_class: SizeClass,
    #[serde(rename = "input")]
    pub input_text: String,
    #[serde(rename = "expect_converted")]
    pub expected_has_converted_output: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub known_broken: bool,
}

impl TestVector {
    pub fn category(&self) -> VectorCategory {
        VectorCategory::from_id(&self.id)
    }

    /// Input length in characters
    pub fn input_len(&self) -> usize {
        self.input_text.chars().count()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Parse a list of vectors from a YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Vec<Self>> {
        let vectors: Vec<Self> = serde_yaml::from_str(yaml)?;
        Ok(vectors)
    }

    /// Parse a list of vectors from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Vec<Self>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::VectorSource(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content).map_err(|e| {
            HarnessError::VectorSource(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Load every `.yaml`/`.yml` file below `dir`, in path order
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut vectors = Vec::new();
        for path in paths {
            vectors.extend(Self::from_file(&path)?);
        }
        Ok(vectors)
    }

    /// Load from a file or a directory of files
    pub fn load_path(path: &Path) -> HarnessResult<Vec<Self>> {
        let vectors = if path.is_dir() {
            Self::load_all(path)?
        } else {
            Self::from_file(path)?
        };
        validate(&vectors)?;
        Ok(vectors)
    }
}

/// Reject empty sets, duplicate or blank ids, and blank inputs
pub fn validate(vectors: &[TestVector]) -> HarnessResult<()> {
    if vectors.is_empty() {
        return Err(HarnessError::VectorSource("no test vectors found".to_string()));
    }
    let mut seen = HashSet::new();
    for v in vectors {
        if v.id.trim().is_empty() {
            return Err(HarnessError::VectorSource(format!(
                "vector '{}' has an empty id",
                v.name
            )));
        }
        if v.input_text.is_empty() {
            return Err(HarnessError::VectorSource(format!("{} has an empty input", v.id)));
        }
        if !seen.insert(v.id.as_str()) {
            return Err(HarnessError::VectorSource(format!("duplicate vector id {}", v.id)));
        }
    }
    Ok(())
}

/// Which vectors a run executes
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub tag: Option<String>,
    pub pattern: Option<Regex>,
    pub id: Option<String>,
}

impl Selection {
    pub fn matches(&self, vector: &TestVector) -> bool {
        if let Some(tag) = &self.tag {
            if !vector.has_tag(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if &vector.id != id {
                return false;
            }
        }
        if let Some(re) = &self.pattern {
            if !re.is_match(&vector.id) && !re.is_match(&vector.name) {
                return false;
            }
        }
        true
    }

    /// Keeps table order
    pub fn apply(&self, vectors: Vec<TestVector>) -> Vec<TestVector> {
        vectors.into_iter().filter(|v| self.matches(v)).collect()
    }
}

struct Row {
    id: &'static str,
    name: &'static str,
    size: SizeClass,
    input: &'static str,
    converted: bool,
    tags: &'static [&'static str],
}

const fn row(
    id: &'static str,
    name: &'static str,
    size: SizeClass,
    input: &'static str,
    converted: bool,
    tags: &'static [&'static str],
) -> Row {
    Row { id, name, size, input, converted, tags }
}

use SizeClass::{L, M, S};

const BUILTIN: &[Row] = &[
    row("Pos_Fun_0001", "nalama test", S, "nalama? ", true, &["Question", "Greeting"]),
    row("Pos_Fun_0002", "work going test", S, "naan velaikupoga poren ", true, &["Daily activity", "Statement"]),
    row("Pos_Fun_0003", "playing test", S, "naan vilayaduren ", true, &["Leisure", "Action"]),
    row("Pos_Fun_0004", "life going test", S, "eppadi vaalkaiellam poguthu? ", true, &["Well-being", "Question"]),
    row("Pos_Fun_0005", "what work test", S, "enna velayaa? ", true, &["Work inquiry", "Question"]),
    row("Pos_Fun_0006", "come command test", S, "vaa daa? ", true, &["Invitation", "Command"]),
    row("Pos_Fun_0007", "wait test", S, "thaanga ", true, &["Request", "Direction"]),
    row("Pos_Fun_0008", "work done test", S, "naan velai sairen ", true, &["Completion", "Past action"]),
    row("Pos_Fun_0009", "work not done test", S, "naan velai saiyamaten ", true, &["Negation", "Past action"]),
    row("Pos_Fun_0010", "played test", S, "naan vilayaditen ", true, &["Past tense", "Leisure"]),
    row("Pos_Fun_0011", "playing ongoing test", S, "naan vilayadikondu irrukiren ", true, &["Present continuous", "Action"]),
    row("Pos_Fun_0012", "play future test", S, "naan vilayaduven ", true, &["Future tense", "Leisure"]),
    row("Pos_Fun_0013", "existence test", S, "naan irruken ", true, &["Being/existence", "State"]),
    row("Pos_Fun_0014", "two word sentence", M, "naan velai sairen aana konjathula poiruven veetuku vaa ", true, &["Multiple words", "Combination"]),
    row("Pos_Fun_0015", "three word sentence", M, "naan sapitu velaikupogaporen vanthu rendu perum seanthu vilayaduvom ", true, &["Conjunction", "Reason"]),
    row("Pos_Fun_0016", "with punctuation", S, "vaalthukal! ", true, &["Punctuation", "Greeting"]),
    row("Pos_Fun_0017", "with numbers", S, "naan 7 naal veilikuponren ", true, &["Numbers", "Action"]),
    row(
        "Pos_Fun_0018",
        "longer mixed",
        L,
        "naan ippo thaan vilayada poga ready aayittu iruken aana nee modhalla namma veetukku vandhu enna un bike-ila eathikondu pona thaan nalla irukkum. namma rendu perum ground-ukku saenthu poiitu nalla vilayaduvom. ippadi poovathu enakku romba sandhoshama irukkum,  nee yosikama seekiram kilambi vaa.unakaga naan namma veettu gate kittaye kaathukondu irupen, thamaadham pannama seekirama vaa nanba ",
        true,
        &["Long input", "Complex"],
    ),
    row("Pos_Fun_0019", "action with reason", M, "naan iruka sollren  ", true, &["Explanation", "Reason"]),
    row("Pos_Fun_0020", "another question", S, "ithu sariya? ", true, &["Query", "Consent"]),
    row("Pos_Fun_0021", "state verb", S, "enakku puriyuthu ", true, &["Understanding", "State"]),
    row("Pos_Fun_0022", "polite form", S, "neenga vanga ", true, &["Polite", "Request"]),
    row("Pos_Fun_0023", "negation with not", S, "naan velaikku poga maaten ", true, &["Negation", "Direction"]),
    row(
        "Pos_Fun_0024",
        "very long sentence",
        L,
        "naan ippo thaan velaiku poga velikkittu kondu iruken aana enakku oru nalla yosunai vandhuchu nee modhalla namma veetukku vaa rendu perum serndhu ukandhu sapiduvom. sappadu mudichutu namma pesite bus yeridalam. romba naal achu ippadi serndhu poradhu, kandippa varuvennu nambaren. seekiram kilambi vaa, unakaga nalla rusiyaana sappadu amma thayaar senji vachi irrukanga. veliya nalla mazhai varum pola iruku kudai eduthukittu paathu bathirama vaa nanba",
        true,
        &["Length", "Complexity"],
    ),
    row("Pos_Fun_0025", "query what you doing", S, "enna panringa? ", true, &["Present action", "Question"]),
    row("Neg_Fun_0001", "no space between words", S, " nalamairrukenNeenga ", false, &["Invalid", "Error handling"]),
    row("Neg_Fun_0002", "misspelled word", S, " nalllamaaa ", false, &["Typo", "Robustness"]),
    row("Neg_Fun_0003", "random characters", S, "xyz123abc ", false, &["Non-tamil", "Invalid"]),
    row("Neg_Fun_0004", "mixed english", S, "naan chicken noodles sapidaren ", false, &["Mixed", "Error"]),
    row("Neg_Fun_0005", "incomplete", S, "vang ", false, &["Partial", "Invalid"]),
    row("Neg_Fun_0006", "only symbols", S, "!@#$%^ ", false, &["Symbols", "Invalid"]),
    row("Neg_Fun_0007", "only numbers", S, "12345 ", false, &["Numbers only", "Invalid"]),
    row("Neg_Fun_0008", "repeated characters", S, "naaaaaaaaaaan ", false, &["Repetition", "Invalid"]),
    row(
        "Neg_Fun_0009",
        "very long invalid",
        L,
        "an44n ippo th44n v3l@iku p0g4 th4y44r 44yikittu iruk3n @4n4 3n4kku oru n4ll4 y0sun4i v4ndhuchu. n33 m0dh4ll4 n4mm4 v33tukku v44, r3ndu p3rum s3rndhu uk4ndhu n4ll4 s4piduvom. s4pp4du mudichutu n4mm4 p3sit3 j0lly-@ bus y3rid4l4m. r0mb4 n44l 4chu ipp4di s3rndhu p0r4dhu, so k4n61994 v44. un4k4g4 n4ll4 rusiy44n4 chick3n n00dl3s @mm4 s3nji v4churuk44ng4, r0mb4 s33kir4m v44 n4nb4! v3liy4 n4ll4 m4zh4i v4rum p0l4 iruku so p44thu b4thir4m4 v44 ",
        false,
        &["Long invalid", "Error"],
    ),
    row("Neg_Fun_0010", "mixed valid and invalid", M, "na1n ch33s vilay5dur3n  n3eyu8 vaa v1lay4duv0m  ", false, &["Mixed", "Error"]),
    row("Pos_UI_0001", "real-time conversion test", S, "naan velaikupoga poren ", true, &["Real-time", "Typing", "Updates", "Conversion"]),
];

/// The built-in suite: 25 positive, 10 negative and 1 UI-behavior vector
pub fn builtin() -> Vec<TestVector> {
    BUILTIN
        .iter()
        .map(|r| TestVector {
            id: r.id.to_string(),
            name: r.name.to_string(),
            size_class: r.size,
            input_text: r.input.to_string(),
            expected_has_converted_output: r.converted,
            tags: r.tags.iter().map(|t| t.to_string()).collect(),
            known_broken: false,
        })
        .collect()
}

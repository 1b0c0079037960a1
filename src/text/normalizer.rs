use once_cell::sync::Lazy;
use regex::Regex;

use super::segmenter::math_spans;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Spoken operators and relations, multi-word forms first.
static SPOKEN_OPS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bis equal to\b", "="),
        (r"(?i)\bequals\b", "="),
        (r"(?i)\bplus\b", "+"),
        (r"(?i)\bminus\b", "-"),
        (r"(?i)\bmultiplied by\b", "×"),
        (r"(?i)\btimes\b", "×"),
        (r"(?i)\bdivided by\b", "÷"),
    ]
    .iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
    .collect()
});

/// Spoken function application: "sine of x" and friends.
static SPOKEN_FNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bsine of\s+(\w+)", "sin(${1})"),
        (r"(?i)\bcosine of\s+(\w+)", "cos(${1})"),
        (r"(?i)\btangent of\s+(\w+)", "tan(${1})"),
        (r"(?i)\bsquare root of\s+(\w+)", "sqrt(${1})"),
        (r"(?i)\blog of\s+(\w+)", "log(${1})"),
        (r"(?i)\b(\w+)\s+squared\b", "${1}^2"),
        (r"(?i)\b(\w+)\s+cubed\b", "${1}^3"),
    ]
    .iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
    .collect()
});

/// Greek letter names to glyphs.
static GREEK: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\balpha\b", "α"),
        (r"(?i)\bbeta\b", "β"),
        (r"(?i)\bgamma\b", "γ"),
        (r"(?i)\bdelta\b", "δ"),
        (r"(?i)\btheta\b", "θ"),
        (r"(?i)\blambda\b", "λ"),
        (r"(?i)\bpi\b", "π"),
        (r"(?i)\bsigma\b", "σ"),
        (r"(?i)\bomega\b", "ω"),
    ]
    .iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
    .collect()
});

static NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[\[(](?:inaudible|crosstalk|background noise|noise|silence|music|laughter|coughing)[\])]",
    )
    .unwrap()
});

static TENS_ONES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety)[\s-](one|two|three|four|five|six|seven|eight|nine)\b",
    )
    .unwrap()
});

static NUMBER_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(zero|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety)\b",
    )
    .unwrap()
});

static ORDINAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth)\b")
        .unwrap()
});

/// Apply `f` to the stretches of `text` outside `$...$`/`$$...$$` spans,
/// passing the spans through untouched.
fn apply_outside_math<F>(text: &str, f: F) -> String
where
    F: Fn(&str) -> String,
{
    let spans = math_spans(text);
    if spans.is_empty() {
        return f(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&f(&text[cursor..span.start]));
        out.push_str(&text[span.start..span.end]);
        cursor = span.end;
    }
    out.push_str(&f(&text[cursor..]));
    out
}

/// Stage 1: collapse runs of whitespace/newlines to single spaces and trim.
/// Math spans keep their internal spacing.
pub fn collapse_whitespace(text: &str) -> String {
    apply_outside_math(text, |chunk| WS_RE.replace_all(chunk, " ").into_owned())
        .trim()
        .to_string()
}

/// Stage 2: rewrite spoken operators, spoken function names, and Greek
/// letter names to notation. Text inside math delimiters is left alone.
pub fn rewrite_spoken_math(text: &str) -> String {
    apply_outside_math(text, |chunk| {
        let mut result = chunk.to_string();
        for (regex, replacement) in SPOKEN_FNS.iter() {
            result = regex.replace_all(&result, *replacement).into_owned();
        }
        for (regex, replacement) in SPOKEN_OPS.iter() {
            result = regex.replace_all(&result, *replacement).into_owned();
        }
        for (regex, replacement) in GREEK.iter() {
            result = regex.replace_all(&result, *replacement).into_owned();
        }
        result
    })
}

/// Stage 3: remove bracketed transcription-noise tags and re-collapse the
/// whitespace they leave behind.
pub fn strip_noise_tokens(text: &str) -> String {
    let stripped = apply_outside_math(text, |chunk| NOISE_RE.replace_all(chunk, "").into_owned());
    collapse_whitespace(&stripped)
}

/// Stage 4: spell small numbers and ordinals as digits.
pub fn digits_from_words(text: &str) -> String {
    apply_outside_math(text, |chunk| {
        let compounds = TENS_ONES_RE.replace_all(chunk, |caps: &regex::Captures| {
            let tens = number_word_value(&caps[1]);
            let ones = number_word_value(&caps[2]);
            (tens + ones).to_string()
        });
        let singles = NUMBER_WORD_RE.replace_all(&compounds, |caps: &regex::Captures| {
            number_word_value(&caps[1]).to_string()
        });
        ORDINAL_RE
            .replace_all(&singles, |caps: &regex::Captures| {
                ordinal_form(&caps[1]).to_string()
            })
            .into_owned()
    })
}

/// The full cleanup pipeline in its fixed order. Each stage is a no-op on
/// text with nothing to rewrite.
pub fn normalize(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    let rewritten = rewrite_spoken_math(&collapsed);
    let stripped = strip_noise_tokens(&rewritten);
    digits_from_words(&stripped)
}

fn number_word_value(word: &str) -> u32 {
    match word.to_ascii_lowercase().as_str() {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        _ => 90,
    }
}

fn ordinal_form(word: &str) -> &'static str {
    match word.to_ascii_lowercase().as_str() {
        "first" => "1st",
        "second" => "2nd",
        "third" => "3rd",
        "fourth" => "4th",
        "fifth" => "5th",
        "sixth" => "6th",
        "seventh" => "7th",
        "eighth" => "8th",
        "ninth" => "9th",
        _ => "10th",
    }
}

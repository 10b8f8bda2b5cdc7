//! String-aware scanning and repair of near-JSON text.
//!
//! Everything here is pure string manipulation over `char`s: no regex and
//! no allocation beyond the output buffer.

/// Chat-template tokens some models leak into their completions.
const CHAT_TOKENS: &[&str] = &[
    "<|im_start|>assistant",
    "<|im_start|>",
    "<|im_end|>",
    "<|assistant|>",
    "<|end|>",
    "<|eot_id|>",
    "[/INST]",
    "[INST]",
    "</s>",
    "<s>",
];

/// Leading labels in front of the payload.
const LABELS: &[&str] = &["json:", "output:", "response:", "answer:", "result:"];

/// Remove code fences, chat tokens and leading labels.
pub(crate) fn strip_wrappers(raw: &str) -> String {
    let mut text = raw.to_string();
    for token in CHAT_TOKENS {
        text = text.replace(token, "");
    }

    if let Some(fenced) = fenced_body(&text) {
        text = fenced.to_string();
    }

    let mut body = text.trim();
    loop {
        let before = body;
        for label in LABELS {
            if body.get(..label.len()).is_some_and(|head| head.eq_ignore_ascii_case(label)) {
                body = body[label.len()..].trim_start();
            }
        }
        if body == before {
            break;
        }
    }
    body.trim().to_string()
}

/// Body of the first ``` fence, language tag dropped. An unterminated fence
/// runs to the end of the text.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    // A tag-less fence on a single line: ```{...}```
    let body = if after[..body_start].trim_start().starts_with(['{', '[']) { after } else { &after[body_start..] };
    Some(match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    })
}

/// Tracks whether the scanner is inside a double-quoted JSON string.
#[derive(Default)]
struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    /// Feed one char; returns true if it is structural (outside a string).
    fn step(&mut self, c: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
            return false;
        }
        if c == '"' {
            self.in_string = true;
            return false;
        }
        true
    }
}

/// Every balanced `{…}` or `[…]` block in the text, ordered by where it
/// opens. One pass with one stack: a closer that does not match the open
/// block discards every block still open.
pub(crate) fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut stack: Vec<(usize, char)> = Vec::new();
    let mut strings = StringState::default();
    for (i, c) in text.char_indices() {
        if !strings.step(c) {
            continue;
        }
        match c {
            '{' => stack.push((i, '}')),
            '[' => stack.push((i, ']')),
            '}' | ']' => match stack.pop() {
                Some((start, closer)) if closer == c => spans.push((start, i + c.len_utf8())),
                Some(_) => stack.clear(),
                None => {}
            },
            _ => {}
        }
    }
    spans.sort_by_key(|&(start, _)| start);
    spans.into_iter().map(|(start, end)| &text[start..end]).collect()
}

/// Typographic quotes to ASCII.
pub(crate) fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            other => other,
        })
        .collect()
}

/// Drop control characters other than ordinary whitespace.
pub(crate) fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// `{'a': 'b'}` to `{"a": "b"}`, only when the text has no double quotes.
pub(crate) fn promote_single_quotes(text: &str) -> String {
    if text.contains('"') {
        text.to_string()
    } else {
        text.replace('\'', "\"")
    }
}

/// Remove commas directly followed (modulo whitespace) by `}` or `]`.
pub(crate) fn drop_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut strings = StringState::default();
    for (i, &c) in chars.iter().enumerate() {
        if strings.step(c) && c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// From the first opener, cut the text at the first closer that has no
/// matching opener.
pub(crate) fn truncate_unmatched(text: &str) -> &str {
    let Some(start) = text.find(['{', '[']) else {
        return text;
    };
    let mut stack: Vec<char> = Vec::new();
    let mut strings = StringState::default();
    for (i, c) in text[start..].char_indices() {
        if !strings.step(c) {
            continue;
        }
        match c {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return &text[start..start + i];
                }
            }
            _ => {}
        }
    }
    &text[start..]
}

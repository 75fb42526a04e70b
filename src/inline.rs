//! Inline flow: styled runs, whitespace collapsing and greedy line breaking.

use crate::font::FontRegistry;
use crate::types::Pt;

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    /// Resolved drawable font name.
    pub font_name: String,
    pub font_size: Pt,
    pub underline: bool,
    pub strike: bool,
    pub highlight: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InlineItem {
    Text { text: String, style: TextStyle },
    Break,
}

/// A same-style slice of a word.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub text: String,
    pub style: TextStyle,
    pub width: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub pieces: Vec<Piece>,
    pub width: Pt,
    /// Width of the collapsed space preceding this word; ignored at line start.
    pub space_before: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub words: Vec<Word>,
    /// Natural width including inter-word spaces.
    pub width: Pt,
    pub max_font_size: Pt,
    pub height: Pt,
    /// Last line of a paragraph or ended by a forced break; never justified.
    pub ends_paragraph: bool,
}

impl Line {
    fn empty() -> Self {
        Self {
            words: Vec::new(),
            width: Pt::ZERO,
            max_font_size: Pt::ZERO,
            height: Pt::ZERO,
            ends_paragraph: false,
        }
    }

    /// Shrink the whole line so neither its height nor its tallest glyph
    /// exceeds `limit`. Lines that already fit are returned unchanged.
    pub fn fit_height(mut self, limit: Pt) -> Line {
        let tallest = self.height.max(self.max_font_size);
        if tallest <= limit || tallest <= Pt::ZERO {
            return self;
        }
        let ratio = limit.to_f32() / tallest.to_f32();
        for word in &mut self.words {
            for piece in &mut word.pieces {
                piece.style.font_size = piece.style.font_size * ratio;
                piece.width = piece.width * ratio;
            }
            word.width = word.width * ratio;
            word.space_before = word.space_before * ratio;
        }
        self.width = self.width * ratio;
        self.height = (self.height * ratio).min(limit);
        self.max_font_size = (self.max_font_size * ratio).min(limit);
        self
    }

    fn push(&mut self, word: Word) {
        if !self.words.is_empty() {
            self.width += word.space_before;
        }
        self.width += word.width;
        for piece in &word.pieces {
            self.max_font_size = self.max_font_size.max(piece.style.font_size);
        }
        self.words.push(word);
    }

    fn seal(mut self, multiplier: f32, base_font_size: Pt, ends_paragraph: bool) -> Line {
        let size = if self.words.is_empty() {
            base_font_size
        } else {
            self.max_font_size
        };
        self.max_font_size = size;
        self.height = size * multiplier;
        self.ends_paragraph = ends_paragraph;
        self
    }
}

fn is_breaking_space(ch: char) -> bool {
    ch.is_whitespace() && ch != '\u{00A0}'
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(Word),
    Break,
}

struct Tokenizer<'a> {
    fonts: &'a FontRegistry,
    tokens: Vec<Token>,
    pieces: Vec<(String, TextStyle)>,
    pending_space: Pt,
}

impl<'a> Tokenizer<'a> {
    fn flush_word(&mut self) {
        if self.pieces.is_empty() {
            return;
        }
        let pieces: Vec<Piece> = std::mem::take(&mut self.pieces)
            .into_iter()
            .map(|(text, style)| {
                let width = self.fonts.measure(&style.font_name, style.font_size, &text);
                Piece { text, style, width }
            })
            .collect();
        let width = pieces.iter().map(|piece| piece.width).sum();
        self.tokens.push(Token::Word(Word {
            pieces,
            width,
            space_before: self.pending_space,
        }));
        self.pending_space = Pt::ZERO;
    }

    fn push_char(&mut self, ch: char, style: &TextStyle) {
        match self.pieces.last_mut() {
            Some((text, piece_style)) if piece_style == style => text.push(ch),
            _ => self.pieces.push((ch.to_string(), style.clone())),
        }
    }
}

fn tokenize(items: &[InlineItem], fonts: &FontRegistry) -> Vec<Token> {
    let mut tk = Tokenizer {
        fonts,
        tokens: Vec::new(),
        pieces: Vec::new(),
        pending_space: Pt::ZERO,
    };
    for item in items {
        match item {
            InlineItem::Break => {
                tk.flush_word();
                tk.tokens.push(Token::Break);
                tk.pending_space = Pt::ZERO;
            }
            InlineItem::Text { text, style } => {
                for ch in text.chars() {
                    if is_breaking_space(ch) {
                        tk.flush_word();
                        if tk.pending_space == Pt::ZERO {
                            tk.pending_space = fonts.measure(&style.font_name, style.font_size, " ");
                        }
                    } else {
                        tk.push_char(ch, style);
                    }
                }
            }
        }
    }
    tk.flush_word();
    tk.tokens
}

/// Split a word that cannot fit on an empty line into chunks of at most
/// `available` width (at least one character each).
fn split_word(word: Word, available: Pt, fonts: &FontRegistry) -> Vec<Word> {
    let mut out: Vec<Word> = Vec::new();
    let mut chunk: Vec<Piece> = Vec::new();
    let mut chunk_width = Pt::ZERO;
    let mut space_before = word.space_before;

    for piece in word.pieces {
        for ch in piece.text.chars() {
            let mut buf = [0u8; 4];
            let ch_str: &str = ch.encode_utf8(&mut buf);
            let ch_width = fonts.measure(&piece.style.font_name, piece.style.font_size, ch_str);
            let has_content = chunk.iter().any(|p| !p.text.is_empty());
            if has_content && chunk_width + ch_width > available {
                out.push(Word {
                    pieces: std::mem::take(&mut chunk),
                    width: chunk_width,
                    space_before,
                });
                chunk_width = Pt::ZERO;
                space_before = Pt::ZERO;
            }
            match chunk.last_mut() {
                Some(last) if last.style == piece.style => {
                    last.text.push(ch);
                    last.width += ch_width;
                }
                _ => chunk.push(Piece {
                    text: ch.to_string(),
                    style: piece.style.clone(),
                    width: ch_width,
                }),
            }
            chunk_width += ch_width;
        }
    }
    if !chunk.is_empty() {
        out.push(Word {
            pieces: chunk,
            width: chunk_width,
            space_before,
        });
    }
    out
}

/// Greedy line breaking of inline items into lines no wider than
/// `available`, except single characters wider than the line.
pub fn break_lines(
    items: &[InlineItem],
    available: Pt,
    multiplier: f32,
    base_font_size: Pt,
    fonts: &FontRegistry,
) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut line = Line::empty();

    for token in tokenize(items, fonts) {
        let word = match token {
            Token::Break => {
                let done = std::mem::replace(&mut line, Line::empty());
                lines.push(done.seal(multiplier, base_font_size, true));
                continue;
            }
            Token::Word(word) => word,
        };
        let space = if line.words.is_empty() {
            Pt::ZERO
        } else {
            word.space_before
        };
        if line.width + space + word.width <= available {
            line.push(word);
            continue;
        }
        if !line.words.is_empty() {
            let done = std::mem::replace(&mut line, Line::empty());
            lines.push(done.seal(multiplier, base_font_size, false));
        }
        if word.width <= available {
            line.push(word);
            continue;
        }
        let mut chunks = split_word(word, available, fonts);
        let last = chunks.pop();
        for chunk in chunks {
            let mut full = Line::empty();
            full.push(chunk);
            lines.push(full.seal(multiplier, base_font_size, false));
        }
        if let Some(last) = last {
            line.push(last);
        }
    }

    // A trailing break does not open a visible line, unless it is the only one.
    if !line.words.is_empty() {
        lines.push(line.seal(multiplier, base_font_size, true));
    }
    lines
}

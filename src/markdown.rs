//! HTML-to-Markdown conversion on top of `htmd`.
//!
//! `htmd` does the tree walk. The handlers registered here add what it
//! leaves out: GFM pipe tables, `~~strikethrough~~` and fenced code
//! blocks that carry the `language-xxx` hint of the source markup. The
//! converter keeps no state between calls, so the same markup and
//! options always produce byte-identical output.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use htmd::options::{
    BrStyle, BulletListMarker, CodeBlockFence, CodeBlockStyle as HtmdCodeBlockStyle,
    HeadingStyle as HtmdHeadingStyle, HrStyle, Options,
};
use htmd::{Element, HtmlToMarkdown};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::Result;

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("WHITESPACE should compile"));
static LANGUAGE_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:language|lang)-([A-Za-z0-9_+#.-]+)$").expect("LANGUAGE_CLASS should compile")
});
static PRE: Lazy<Selector> = Lazy::new(|| Selector::parse("pre").expect("PRE should parse"));

const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "template", "head", "iframe", "svg", "canvas",
];

// Table cells and rows travel up to the `table` handler tagged with
// ASCII separator characters, which never occur in converted text.
const CELL: char = '\u{1f}';
const ROW: char = '\u{1e}';
const CAPTION: char = '\u{1d}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadingStyle {
    /// `# Title`
    Atx,
    /// Underlined with `===` / `---` for levels 1 and 2.
    Setext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeBlockStyle {
    Fenced,
    Indented,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownOptions {
    pub heading_style: HeadingStyle,
    pub code_block_style: CodeBlockStyle,
    /// `-` or `*`; anything else falls back to `-`.
    pub bullet_marker: char,
    /// GFM pipe tables.
    pub tables: bool,
    /// GFM `~~strikethrough~~`.
    pub strikethrough: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            heading_style: HeadingStyle::Atx,
            code_block_style: CodeBlockStyle::Fenced,
            bullet_marker: '-',
            tables: true,
            strikethrough: true,
        }
    }
}

impl MarkdownOptions {
    fn htmd(&self) -> Options {
        Options {
            heading_style: match self.heading_style {
                HeadingStyle::Atx => HtmdHeadingStyle::Atx,
                HeadingStyle::Setext => HtmdHeadingStyle::Setex,
            },
            code_block_style: match self.code_block_style {
                CodeBlockStyle::Fenced => HtmdCodeBlockStyle::Fenced,
                CodeBlockStyle::Indented => HtmdCodeBlockStyle::Indented,
            },
            code_block_fence: CodeBlockFence::Backticks,
            bullet_list_marker: match self.bullet_marker {
                '*' => BulletListMarker::Asterisk,
                _ => BulletListMarker::Dash,
            },
            br_style: BrStyle::TwoSpaces,
            hr_style: HrStyle::Dashes,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownConverter {
    options: MarkdownOptions,
}

impl MarkdownConverter {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    pub fn convert(&self, html: &str) -> Result<String> {
        let code_blocks = self.code_blocks(html);
        let markdown = self.build(code_blocks).convert(html)?;
        Ok(markdown.trim_matches('\n').to_string())
    }

    /// Pre-renders every `<pre>` in document order, the order in which
    /// `htmd` later visits them.
    fn code_blocks(&self, html: &str) -> VecDeque<String> {
        let fragment = Html::parse_fragment(html);
        fragment
            .select(&PRE)
            .filter(|pre| {
                !pre.ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| SKIPPED.contains(&a.value().name()))
            })
            .map(|pre| self.code_block(pre))
            .collect()
    }

    fn code_block(&self, pre: ElementRef) -> String {
        let code = pre
            .children()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "code");
        let language = language_of(pre)
            .or_else(|| code.and_then(language_of))
            .unwrap_or_default();

        let text: String = pre.text().collect();
        let text = text.trim_end_matches('\n');

        match self.options.code_block_style {
            CodeBlockStyle::Fenced => {
                let fence = "`".repeat((longest_run(text, '`') + 1).max(3));
                format!("{}{}\n{}\n{}", fence, language, text, fence)
            }
            CodeBlockStyle::Indented => text
                .lines()
                .map(|line| format!("    {}", line))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn build(&self, code_blocks: VecDeque<String>) -> HtmlToMarkdown {
        let pending = Arc::new(Mutex::new(code_blocks));
        let strikethrough = self.options.strikethrough;
        let tables = self.options.tables;

        HtmlToMarkdown::builder()
            .options(self.options.htmd())
            .skip_tags(SKIPPED.to_vec())
            .add_handler(vec!["pre"], move |_: Element| {
                let block = pending.lock().ok()?.pop_front()?;
                Some(format!("\n\n{}\n\n", block))
            })
            .add_handler(vec!["del", "s", "strike"], move |el: Element| {
                let text = el.content.trim();
                if text.is_empty() || !strikethrough {
                    return Some(el.content.to_string());
                }
                Some(format!("~~{}~~", text))
            })
            .add_handler(vec!["th", "td"], |el: Element| {
                let cell = single_line(el.content).replace("\\|", "|").replace('|', "\\|");
                Some(format!("{}{}", CELL, cell))
            })
            .add_handler(vec!["tr"], |el: Element| Some(format!("{}{}", ROW, el.content)))
            .add_handler(vec!["caption"], |el: Element| {
                Some(format!("{}{}{}", CAPTION, single_line(el.content), CAPTION))
            })
            .add_handler(vec!["table"], move |el: Element| {
                Some(format!("\n\n{}\n\n", render_table(el.content, tables)))
            })
            .build()
    }
}

/// Converts with the default options.
pub fn html_to_markdown(html: &str) -> Result<String> {
    MarkdownConverter::default().convert(html)
}

fn render_table(content: &str, gfm: bool) -> String {
    let caption = content
        .split(CAPTION)
        .nth(1)
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut rows: Vec<Vec<String>> = content
        .split(ROW)
        .skip(1)
        .map(|row| {
            row.split(CELL)
                .skip(1)
                .map(|cell| cell.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    if rows.is_empty() {
        return caption.unwrap_or_default().to_string();
    }
    let header = rows.remove(0);

    let mut out = Vec::new();
    if let Some(caption) = caption {
        out.push(caption.to_string());
        out.push(String::new());
    }

    if !gfm {
        for row in std::iter::once(&header).chain(rows.iter()) {
            out.push(row.join(" "));
        }
        return out.join("\n").trim().to_string();
    }

    let columns = std::iter::once(&header)
        .chain(rows.iter())
        .map(Vec::len)
        .max()
        .unwrap_or(1);

    out.push(table_line(&header, columns));
    out.push(table_line(&vec!["---".to_string(); columns], columns));
    for row in &rows {
        out.push(table_line(row, columns));
    }
    out.join("\n")
}

fn table_line(cells: &[String], columns: usize) -> String {
    let padded: Vec<&str> = (0..columns)
        .map(|i| cells.get(i).map(String::as_str).unwrap_or(""))
        .collect();
    format!("| {} |", padded.join(" | "))
}

fn single_line(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn longest_run(text: &str, needle: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == needle {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn language_of(el: ElementRef) -> Option<String> {
    el.value()
        .classes()
        .find_map(|class| LANGUAGE_CLASS.captures(class))
        .map(|caps| caps[1].to_string())
}

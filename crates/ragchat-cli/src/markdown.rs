//! Markdown to ratatui text conversion.
//!
//! Answers from the assistant are markdown: headings, lists, tables of
//! regulation details and the occasional code block. This module turns them
//! into styled lines for the chat column.

use std::sync::OnceLock;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

const CODE_THEME: &str = "base16-ocean.dark";

/// Convert markdown text to styled lines no wider than `available_width`
/// where it matters (code blocks and tables).
pub fn render_markdown(text: &str, available_width: usize) -> Vec<Line<'static>> {
    MarkdownWriter::new(available_width).render(text)
}

// =============================================================================
// Syntax highlighting
// =============================================================================

struct Highlighting {
    syntaxes: SyntaxSet,
    theme: Theme,
}

/// Loaded once: the default syntax set is expensive to build and the chat
/// column is re-rendered on every frame.
fn highlighting() -> &'static Highlighting {
    static HIGHLIGHTING: OnceLock<Highlighting> = OnceLock::new();
    HIGHLIGHTING.get_or_init(|| {
        let mut themes = ThemeSet::load_defaults();
        let theme = themes.themes.remove(CODE_THEME).unwrap_or_default();
        Highlighting {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme,
        }
    })
}

fn highlight_code(code: &str, lang: &str) -> Vec<Vec<Span<'static>>> {
    let hl = highlighting();
    let syntax = hl
        .syntaxes
        .find_syntax_by_token(lang)
        .or_else(|| hl.syntaxes.find_syntax_by_extension(lang))
        .unwrap_or_else(|| hl.syntaxes.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, &hl.theme);

    LinesWithEndings::from(code)
        .map(|line| match highlighter.highlight_line(line, &hl.syntaxes) {
            Ok(ranges) => ranges
                .into_iter()
                .filter_map(|(style, piece)| {
                    let piece = piece.trim_end_matches(['\n', '\r']);
                    if piece.is_empty() {
                        return None;
                    }
                    let fg = style.foreground;
                    let mut out = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
                    if style.font_style.contains(FontStyle::BOLD) {
                        out = out.add_modifier(Modifier::BOLD);
                    }
                    if style.font_style.contains(FontStyle::ITALIC) {
                        out = out.add_modifier(Modifier::ITALIC);
                    }
                    Some(Span::styled(piece.to_string(), out))
                })
                .collect(),
            Err(_) => vec![Span::styled(
                line.trim_end_matches(['\n', '\r']).to_string(),
                Style::default().fg(Color::Yellow),
            )],
        })
        .collect()
}

// =============================================================================
// Tables
// =============================================================================

#[derive(Default)]
struct TableBuilder {
    alignments: Vec<Alignment>,
    rows: Vec<Vec<String>>,
    header_rows: usize,
    cell: String,
    row: Vec<String>,
}

impl TableBuilder {
    fn finish_cell(&mut self) {
        self.row.push(std::mem::take(&mut self.cell).trim().to_string());
    }

    fn finish_row(&mut self) {
        let row = std::mem::take(&mut self.row);
        self.rows.push(row);
    }

    fn render(self, available_width: usize) -> Vec<Line<'static>> {
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return Vec::new();
        }

        let mut widths = vec![0usize; columns];
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(Span::raw(cell.as_str()).width());
            }
        }

        // Shrink the widest columns until the table fits: "│ a │ b │".
        let budget = available_width.saturating_sub(3 * columns + 1);
        while widths.iter().sum::<usize>() > budget {
            let Some(widest) = widths.iter_mut().max() else { break };
            if *widest <= 3 {
                break;
            }
            *widest -= 1;
        }

        let border = Style::default().fg(Color::DarkGray);
        let rule = |left: &str, mid: &str, right: &str| {
            let mut s = String::from(left);
            for (i, w) in widths.iter().enumerate() {
                s.push_str(&"─".repeat(w + 2));
                s.push_str(if i + 1 == columns { right } else { mid });
            }
            Line::from(Span::styled(s, border))
        };

        let mut lines = vec![rule("┌", "┬", "┐")];
        for (r, row) in self.rows.iter().enumerate() {
            let is_header = r < self.header_rows;
            let mut spans = vec![Span::styled("│", border)];
            for (i, width) in widths.iter().enumerate() {
                let cell = row.get(i).map_or("", String::as_str);
                let align = self.alignments.get(i).copied().unwrap_or(Alignment::None);
                let text = fit_cell(cell, *width, align);
                let style = if is_header {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                spans.push(Span::raw(" "));
                spans.push(Span::styled(text, style));
                spans.push(Span::raw(" "));
                spans.push(Span::styled("│", border));
            }
            lines.push(Line::from(spans));
            if is_header && r + 1 == self.header_rows {
                lines.push(rule("├", "┼", "┤"));
            }
        }
        lines.push(rule("└", "┴", "┘"));
        lines
    }
}

/// Pad or truncate `text` to exactly `width` display columns.
fn fit_cell(text: &str, width: usize, align: Alignment) -> String {
    let mut out = String::new();
    let mut used = 0;
    let full = Span::raw(text).width() <= width;
    for ch in text.chars() {
        let w = Span::raw(ch.to_string()).width();
        let limit = if full { width } else { width.saturating_sub(1) };
        if used + w > limit {
            break;
        }
        out.push(ch);
        used += w;
    }
    if !full {
        out.push('…');
        used += 1;
    }

    let pad = width.saturating_sub(used);
    match align {
        Alignment::Right => format!("{}{out}", " ".repeat(pad)),
        Alignment::Center => {
            let left = pad / 2;
            format!("{}{out}{}", " ".repeat(left), " ".repeat(pad - left))
        }
        Alignment::Left | Alignment::None => format!("{out}{}", " ".repeat(pad)),
    }
}

// =============================================================================
// Writer
// =============================================================================

struct MarkdownWriter {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    code: Option<(String, String)>,
    table: Option<TableBuilder>,
    lists: Vec<Option<u64>>,
    link_target: Option<String>,
    width: usize,
}

impl MarkdownWriter {
    fn new(width: usize) -> Self {
        Self {
            lines: Vec::new(),
            spans: Vec::new(),
            styles: vec![Style::default()],
            code: None,
            table: None,
            lists: Vec::new(),
            link_target: None,
            width,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, f: impl FnOnce(Style) -> Style) {
        let next = f(self.style());
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn flush(&mut self) {
        if !self.spans.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.spans)));
        }
    }

    fn blank(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, body)) = self.code.as_mut() {
            body.push_str(text);
            return;
        }
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(text);
            return;
        }
        let style = self.style();
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.flush();
            }
            if !part.is_empty() {
                self.spans.push(Span::styled(part.to_string(), style));
            }
        }
    }

    fn code_block(&mut self, lang: &str, body: &str) {
        self.flush();
        let gutter = Style::default().fg(Color::DarkGray);
        let rule_width = self.width.saturating_sub(2).min(44);

        let mut header = vec![Span::styled("┌", gutter)];
        if !lang.is_empty() {
            header.push(Span::styled("─ ", gutter));
            header.push(Span::styled(
                lang.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
            header.push(Span::raw(" "));
        }
        header.push(Span::styled("─".repeat(rule_width.saturating_sub(lang.len() + 3)), gutter));
        self.lines.push(Line::from(header));

        let max_code = self.width.saturating_sub(4);
        for spans in highlight_code(body, lang) {
            let mut line = vec![Span::styled("│ ", gutter)];
            let mut remaining = max_code;
            for span in spans {
                let w = span.width();
                if w <= remaining {
                    remaining -= w;
                    line.push(span);
                } else {
                    let cut: String = span.content.chars().take(remaining.saturating_sub(1)).collect();
                    line.push(Span::styled(cut, span.style));
                    line.push(Span::styled("…", gutter));
                    break;
                }
            }
            self.lines.push(Line::from(line));
        }

        self.lines
            .push(Line::from(Span::styled(format!("└{}", "─".repeat(rule_width)), gutter)));
        self.lines.push(Line::default());
    }

    fn render(mut self, text: &str) -> Vec<Line<'static>> {
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
        for event in Parser::new_ext(text, options) {
            match event {
                Event::Start(tag) => self.start(tag),
                Event::End(tag) => self.end(tag),
                Event::Text(t) => self.text(&t),
                Event::Code(code) => {
                    if let Some(table) = self.table.as_mut() {
                        table.cell.push_str(&code);
                    } else {
                        self.spans.push(Span::styled(
                            code.to_string(),
                            Style::default().fg(Color::Yellow).bg(Color::Rgb(40, 40, 40)),
                        ));
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if let Some(table) = self.table.as_mut() {
                        table.cell.push(' ');
                    } else {
                        self.flush();
                    }
                }
                Event::Rule => {
                    self.flush();
                    self.lines.push(Line::from(Span::styled(
                        "─".repeat(self.width.min(60)),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
                _ => {}
            }
        }
        self.flush();
        while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.blank();
                let color = match level {
                    HeadingLevel::H1 => Color::Magenta,
                    HeadingLevel::H2 => Color::LightMagenta,
                    _ => Color::Blue,
                };
                self.push_style(|s| s.fg(color).add_modifier(Modifier::BOLD));
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.spans
                    .push(Span::styled("▎ ", Style::default().fg(Color::Blue)));
                self.push_style(|s| s.fg(Color::Gray).add_modifier(Modifier::ITALIC));
            }
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((lang, String::new()));
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let b = format!("{indent}{n}. ");
                        *n += 1;
                        b
                    }
                    _ => format!("{indent}• "),
                };
                self.spans
                    .push(Span::styled(bullet, Style::default().fg(Color::Cyan)));
            }
            Tag::Table(alignments) => {
                self.flush();
                self.table = Some(TableBuilder {
                    alignments,
                    ..TableBuilder::default()
                });
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.header_rows = 1;
                }
            }
            Tag::Emphasis => self.push_style(|s| s.add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(|s| s.add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(|s| s.add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { dest_url, .. } => {
                self.link_target = Some(dest_url.to_string());
                self.push_style(|s| s.fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.pop_style();
                self.flush();
            }
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.blank();
                } else {
                    self.flush();
                }
            }
            TagEnd::BlockQuote(_) => {
                self.pop_style();
                self.blank();
            }
            TagEnd::CodeBlock => {
                if let Some((lang, body)) = self.code.take() {
                    self.code_block(&lang, &body);
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.finish_cell();
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.finish_row();
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    let rendered = table.render(self.width);
                    self.lines.extend(rendered);
                    self.lines.push(Line::default());
                }
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(url) = self.link_target.take() {
                    self.spans.push(Span::styled(
                        format!(" ({url})"),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn paragraphs_are_separated_by_blank_line() {
        let lines = plain(&render_markdown("First.\n\nSecond.", 80));
        assert_eq!(lines, vec!["First.", "", "Second."]);
    }

    #[test]
    fn list_items_get_bullets_and_numbers() {
        let lines = plain(&render_markdown("- a\n- b\n\n1. x\n2. y", 80));
        assert!(lines.contains(&"• a".to_string()));
        assert!(lines.contains(&"2. y".to_string()));
    }

    #[test]
    fn table_is_drawn_with_aligned_columns() {
        let md = "| Item | Value |\n|------|------:|\n| Days | 15 |\n| Approver | Lead |";
        let lines = plain(&render_markdown(md, 80));
        let body: Vec<&String> = lines.iter().filter(|l| l.starts_with('│')).collect();
        assert_eq!(body.len(), 3);
        let widths: Vec<usize> = body.iter().map(|l| Span::raw(l.as_str()).width()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{lines:#?}");
        assert!(body[1].contains("Days"));
        assert!(body[1].contains("   15 │"));
        assert!(lines[0].starts_with('┌'));
    }

    #[test]
    fn wide_table_is_truncated_to_width() {
        let md = "| a | b |\n|---|---|\n| aaaaaaaaaaaaaaaaaaaaaaaaaaaa | bbbbbbbbbbbbbbbbbbbbbbbbbbbbb |";
        for line in render_markdown(md, 30) {
            assert!(line.width() <= 30, "line too wide: {line:?}");
        }
    }

    #[test]
    fn code_block_is_framed() {
        let lines = plain(&render_markdown("```rust\nfn main() {}\n```", 80));
        assert!(lines[0].contains("rust"));
        assert!(lines[1].starts_with("│ "));
        assert!(lines[1].contains("fn main"));
        assert!(lines[2].starts_with('└'));
    }

    #[test]
    fn link_target_is_shown() {
        let lines = plain(&render_markdown("[policy](https://intra/policy)", 80));
        assert_eq!(lines[0], "policy (https://intra/policy)");
    }

    #[test]
    fn fit_cell_pads_and_truncates() {
        assert_eq!(fit_cell("ab", 4, Alignment::Left), "ab  ");
        assert_eq!(fit_cell("ab", 4, Alignment::Right), "  ab");
        assert_eq!(fit_cell("abcdef", 4, Alignment::None), "abc…");
        assert_eq!(fit_cell("휴가", 4, Alignment::Left), "휴가");
    }
}

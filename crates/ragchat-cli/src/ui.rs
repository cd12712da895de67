//! UI rendering with ratatui.
//!
//! Single chat column: header, messages, input line and status bar.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap};
use ratatui::Frame;

use ragchat_core::{ContextRef, Message, CONNECTION_FAILED_NOTICE};

use crate::app::{App, ChatMetrics};
use crate::markdown::render_markdown;

/// Horizontal padding for chat content.
const CHAT_PADDING: u16 = 2;

/// Input prompt.
const PROMPT: &str = "> ";

/// Render the UI and report the size of the chat column.
pub fn render(frame: &mut Frame, app: &App) -> ChatMetrics {
    let area = frame.area();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header bar
            Constraint::Min(3),    // Chat
            Constraint::Length(1), // Separator line
            Constraint::Length(1), // Input line
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);
    let metrics = render_chat(frame, app, main_layout[1]);
    render_input_line(frame, app, main_layout[2], main_layout[3]);
    render_status_bar(frame, app, main_layout[4]);
    metrics
}

/// Truncate a string in the middle with ellipsis if it exceeds `max_len` chars.
fn truncate_middle(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len < 5 {
        return s.chars().take(max_len).collect();
    }
    let keep = (max_len - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

/// Render the header bar with title, category filter and service health.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "RAGCHAT";
    let category = app
        .category_filter()
        .map(|c| format!(" · {c}"))
        .unwrap_or_default();
    let health = app.health.label();

    let max_url_width = (area.width as usize / 2).saturating_sub(health.chars().count() + 3);
    let display_url = truncate_middle(app.server_url(), max_url_width);

    let left_width = title.len() + category.chars().count();
    let right_width = display_url.chars().count() + health.chars().count() + 3;
    let gap = (area.width as usize).saturating_sub(left_width + right_width);

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(category, Style::default().fg(Color::Yellow)),
        Span::raw(" ".repeat(gap)),
        Span::raw(display_url),
        Span::raw(" ["),
        Span::styled(health, Style::default().fg(app.health.color())),
        Span::raw("]"),
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Render the message list and return its size.
fn render_chat(frame: &mut Frame, app: &App, area: Rect) -> ChatMetrics {
    let chat_area = Rect::new(
        area.x + CHAT_PADDING,
        area.y,
        area.width.saturating_sub(CHAT_PADDING * 2 + 1), // +1 for scrollbar
        area.height,
    );
    let content_width = chat_area.width as usize;
    let visible_lines = chat_area.height as usize;

    if app.conversation.messages().is_empty() {
        let text = Paragraph::new("Ask a question about company regulations and press Enter")
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(text, chat_area);
        return ChatMetrics {
            total_lines: 0,
            visible_lines,
        };
    }

    let mut lines: Vec<Line<'static>> = Vec::new();
    for msg in app.conversation.messages() {
        if msg.is_user() {
            lines.push(Line::from(vec![
                Span::styled("[You] ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                Span::styled(msg.visible_text().to_string(), Style::default().fg(Color::White)),
            ]));
        } else {
            assistant_lines(app, msg, content_width, &mut lines);
        }
        lines.push(Line::default());
    }

    // Measured with the same word wrap the paragraph renders with.
    let paragraph = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    let metrics = ChatMetrics {
        total_lines: paragraph.line_count(chat_area.width),
        visible_lines,
    };
    let total_lines = metrics.total_lines;
    let offset = app.chat_offset.min(metrics.max_offset());

    let paragraph = paragraph.scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, chat_area);

    if total_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(metrics.max_offset())
            .position(offset)
            .viewport_content_length(visible_lines);
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }

    metrics
}

/// Lines for one assistant message: label, reasoning, answer and sources.
fn assistant_lines(app: &App, msg: &Message, width: usize, lines: &mut Vec<Line<'static>>) {
    let mut label = vec![Span::styled(
        "[Assistant]",
        Style::default()
            .fg(if msg.is_failed() { Color::Red } else { Color::Green })
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(elapsed) = msg.processing_time_label() {
        if !msg.is_failed() {
            label.push(Span::styled(format!(" {elapsed}"), Style::default().fg(Color::DarkGray)));
        }
    }
    lines.push(Line::from(label));

    if msg.has_reasoning() || (msg.is_streaming() && msg.visible_text().is_empty()) {
        reasoning_lines(app, msg, lines);
    }

    // An empty streaming answer shows the pending reasoning headline above.
    if !msg.visible_text().is_empty() {
        let mut body = render_markdown(msg.visible_text(), width);
        if msg.is_failed() && msg.visible_text() == CONNECTION_FAILED_NOTICE {
            let red = Style::default().fg(Color::Red);
            body = body.into_iter().map(|l| l.patch_style(red)).collect();
        }
        if msg.is_streaming() {
            match body.last_mut() {
                Some(last) => last.push_span(Span::styled("▌", Style::default().fg(Color::Cyan))),
                None => body.push(Line::from(Span::styled("▌", Style::default().fg(Color::Cyan)))),
            }
        }
        lines.extend(body);
    }

    if !msg.retrieved_context().is_empty() {
        source_lines(msg.retrieved_context(), msg.context_count(), app.show_context, lines);
    }
}

fn reasoning_lines(app: &App, msg: &Message, lines: &mut Vec<Line<'static>>) {
    let live = !msg.is_reasoning_complete();
    let marker = if live {
        Span::styled(format!("{} ", app.spinner_char()), Style::default().fg(Color::Yellow))
    } else if app.show_reasoning {
        Span::styled("▾ ", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled("▸ ", Style::default().fg(Color::DarkGray))
    };
    lines.push(Line::from(vec![
        marker,
        Span::styled(
            msg.reasoning_headline(),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
        ),
    ]));

    if app.show_reasoning && msg.has_reasoning() {
        let dim = Style::default().fg(Color::DarkGray);
        for text in msg.reasoning_text().lines() {
            lines.push(Line::from(vec![
                Span::styled("│ ", dim),
                Span::styled(text.to_string(), dim.add_modifier(Modifier::ITALIC)),
            ]));
        }
    }
}

fn source_lines(refs: &[ContextRef], count: u32, expanded: bool, lines: &mut Vec<Line<'static>>) {
    lines.push(Line::from(Span::styled(
        format!("Sources ({count})"),
        Style::default().fg(Color::Blue).bold(),
    )));
    for (i, source) in refs.iter().enumerate() {
        let category = match &source.sub_category {
            Some(sub) => format!("{} / {sub}", source.category),
            None => source.category.clone(),
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" {}. ", i + 1), Style::default().fg(Color::DarkGray)),
            Span::styled(format!("[{category}] "), Style::default().fg(Color::Yellow)),
            Span::raw(source.question.clone()),
            Span::styled(
                format!(" {}", source.relevance_percent()),
                Style::default().fg(Color::Green),
            ),
        ]));
        if expanded && !source.answer.trim().is_empty() {
            for text in source.answer.lines() {
                lines.push(Line::from(Span::styled(
                    format!("    {text}"),
                    Style::default().fg(Color::Gray),
                )));
            }
        }
    }
}

/// Render the input line under the chat.
fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect) {
    let separator = Paragraph::new("─".repeat(separator_area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(separator, separator_area);

    let prompt_color = if app.conversation.is_streaming() {
        Color::DarkGray
    } else {
        Color::Cyan
    };
    let input_line = Line::from(vec![
        Span::styled(PROMPT, Style::default().fg(prompt_color)),
        Span::styled(app.input.as_str(), Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(input_line), input_area);

    let cursor = PROMPT.len() + Span::raw(app.input_before_cursor()).width();
    let cursor = u16::try_from(cursor)
        .unwrap_or(u16::MAX)
        .min(input_area.width.saturating_sub(1));
    frame.set_cursor_position((input_area.x + cursor, input_area.y));
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_indicator = if app.conversation.is_streaming() {
        Span::styled(" STREAMING ", Style::default().fg(Color::Black).bg(Color::Yellow))
    } else if app.is_following() {
        Span::styled(" FOLLOW ", Style::default().fg(Color::Black).bg(Color::Green))
    } else {
        Span::styled(" SCROLL ", Style::default().fg(Color::Black).bg(Color::Blue))
    };

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let status = if let Some(ref error) = app.error_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
        ])
    } else if let Some(ref status) = app.status_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(format!(" {status}"), Style::default().fg(Color::Green)),
        ])
    } else {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            key("Enter"),
            Span::raw(":send "),
            key("Esc"),
            Span::raw(":cancel "),
            key("End"),
            Span::raw(":bottom "),
            key("^T"),
            Span::raw(":reasoning "),
            key("^K"),
            Span::raw(":sources "),
            key("^C"),
            Span::raw(":quit"),
        ])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

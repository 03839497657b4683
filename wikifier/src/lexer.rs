//! Character-level lexer that builds the block tree.
//!
//! Source is fed one line at a time. Each character passes through
//! [`Lexer::step`], which resolves brace escapes, comments, escapes,
//! block boundaries and main-level variable assignments before handing
//! ordinary text to the innermost [`Catch`].

use tracing::trace;

use crate::block::{self, BlockId, BlockKind, Conditional, Content, PosContent, push_all, push_text};
use crate::error::ParseError;
use crate::format::{FmtOpts, format_text};
use crate::page::Page;
use crate::position::Position;
use crate::scope::ScopeId;
use crate::value::{Value, fix_for_storage};

/// Blocks open deeper than this keep their braces as text.
const MAX_BLOCK_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Catches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatchKind {
    /// Content of an open block.
    Block(BlockId),
    /// Raw text of a `type{{ ... }}` block.
    BraceEscape,
    /// Name of a main-level `@name` assignment.
    VariableName,
    /// Value of a main-level `@name: value;` assignment.
    VariableValue,
}

/// A context collecting positional content.
#[derive(Debug)]
struct Catch {
    kind: CatchKind,
    content: Vec<PosContent>,
    /// Text given back to the parent if this catch turns out not to apply.
    prefix: Vec<PosContent>,
}

impl Catch {
    fn new(kind: CatchKind) -> Self {
        Catch {
            kind,
            content: Vec::new(),
            prefix: Vec::new(),
        }
    }

    fn last_text(&self) -> Option<&str> {
        match self.content.last() {
            Some(PosContent {
                content: Content::Text(text),
                ..
            }) => Some(text),
            _ => None,
        }
    }
}

/// State of the main-level variable assignment being read.
#[derive(Debug, Default)]
struct Assignment {
    name: String,
    /// `%name`: store the value without formatting it.
    raw: bool,
    /// `-@name;`
    negated: bool,
}

/// Type, name and heading id recovered from the text before a `{`.
#[derive(Debug, Default, PartialEq, Eq)]
struct BlockHeader {
    typ: String,
    name: String,
    heading_id: String,
    /// Bytes of the scanned text that belong to the header.
    consumed: usize,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

pub(crate) struct Lexer {
    /// Position of the character being handled.
    pos: Position,
    last: char,
    escape: bool,
    /// The current character is a control character even when escaped.
    parser_char: bool,
    skip: usize,
    catches: Vec<Catch>,
    block: BlockId,
    comment_level: usize,
    brace_level: usize,
    /// Blocks currently open, main excluded.
    depth: usize,
    /// Unmatched `{` kept as text past [`MAX_BLOCK_DEPTH`].
    overflow: usize,
    assignment: Assignment,
    /// Result of the last evaluated `if`/`elsif`.
    conditional: bool,
    conditional_exists: bool,
    /// A non-space character has appeared on the current line.
    line_started: bool,
}

impl Lexer {
    pub(crate) fn new() -> Self {
        Lexer {
            pos: Position::default(),
            last: '\0',
            escape: false,
            parser_char: false,
            skip: 0,
            catches: vec![Catch::new(CatchKind::Block(BlockId::MAIN))],
            block: BlockId::MAIN,
            comment_level: 0,
            brace_level: 0,
            depth: 0,
            overflow: 0,
            assignment: Assignment::default(),
            conditional: false,
            conditional_exists: false,
            line_started: false,
        }
    }

    /// Lex one line of source, with or without its trailing newline.
    pub(crate) fn feed_line(&mut self, page: &mut Page, line: &str) -> Result<(), ParseError> {
        self.pos.line += 1;
        self.pos.column = 0;
        self.line_started = false;

        // a lone closing brace drops its indentation
        let line = if self.brace_level == 0 && line.trim() == "}" {
            "}\n".to_string()
        } else if line.ends_with('\n') {
            line.to_string()
        } else {
            format!("{}\n", line)
        };

        let chars: Vec<char> = line.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            self.pos.column += 1;
            let next = chars.get(i + 1).copied();
            let next2 = chars.get(i + 2).copied();
            self.step(page, c, next, next2)?;
            if !self.line_started && !c.is_whitespace() {
                self.line_started = true;
            }
        }
        Ok(())
    }

    fn step(
        &mut self,
        page: &mut Page,
        c: char,
        next: Option<char>,
        next2: Option<char>,
    ) -> Result<(), ParseError> {
        // brace escape
        if self.brace_level > 0 {
            if c == '{' {
                self.brace_level += 1;
            } else if c == '}' {
                self.brace_level -= 1;
                if self.brace_level == 0 {
                    let raw = self.pop_catch();
                    push_all(&mut self.top().content, raw.content);
                    self.next_char(c);
                    return Ok(());
                }
            }
            return self.handle_char(c);
        }

        // comments
        if c == '/' && next == Some('*') {
            self.parser_char = true;
            if self.escape {
                return self.handle_char(c);
            }
            self.comment_level += 1;
            self.next_char(c);
            return Ok(());
        }
        if c == '*' && next == Some('/') {
            if self.comment_level == 0 {
                return self.handle_char(c);
            }
            self.comment_level -= 1;
            self.skip += 1;
            self.next_char(c);
            return Ok(());
        }
        if self.comment_level > 0 {
            self.next_char(c);
            return Ok(());
        }

        match c {
            '{' => {
                self.parser_char = true;
                if self.escape {
                    return self.handle_char(c);
                }
                if self.depth >= MAX_BLOCK_DEPTH {
                    if self.overflow == 0 {
                        page.warn(self.pos, format!("Blocks nested more than {} deep", MAX_BLOCK_DEPTH));
                    }
                    self.overflow += 1;
                    return self.handle_char(c);
                }
                self.open_block(page, next, next2)
            }
            '}' => {
                self.parser_char = true;
                if self.escape {
                    return self.handle_char(c);
                }
                if self.overflow > 0 {
                    self.overflow -= 1;
                    return self.handle_char(c);
                }
                if self.block == BlockId::MAIN {
                    return Err(ParseError::CloseMainBlock { pos: self.pos });
                }
                self.close_block(page, self.pos);
                self.next_char(c);
                Ok(())
            }
            '\\' if !self.escape => {
                self.next_char(c);
                Ok(())
            }
            '@' | '%' | ':' | ';' | '-' if self.block == BlockId::MAIN && self.last != '[' => {
                if self.escape {
                    return self.handle_char(c);
                }
                self.assignment_char(page, c, next)
            }
            _ => self.handle_char(c),
        }
    }

    /// Append an ordinary character to the innermost catch.
    fn handle_char(&mut self, c: char) -> Result<(), ParseError> {
        if self.top().kind == CatchKind::VariableName && !is_variable_char(c) {
            // not an assignment after all
            self.give_back();
            self.assignment = Assignment::default();
        }

        if self.top().content.is_empty() && c == '\n' {
            self.next_char(c);
            return Ok(());
        }

        // escapes that reach this far are left for the block parsers and
        // the formatter to interpret
        let add = if self.escape && !self.parser_char {
            format!("{}{}", self.last, c)
        } else {
            c.to_string()
        };
        let pos = self.pos;
        push_text(&mut self.top().content, &add, pos);
        self.next_char(c);
        Ok(())
    }

    fn next_char(&mut self, c: char) {
        self.escape = c == '\\' && !self.escape && self.brace_level == 0;
        self.parser_char = false;
        self.last = c;
    }

    fn top(&mut self) -> &mut Catch {
        let last = self.catches.len() - 1;
        &mut self.catches[last]
    }

    fn pop_catch(&mut self) -> Catch {
        if self.catches.len() > 1 {
            self.catches.pop().unwrap_or_else(|| Catch::new(CatchKind::BraceEscape))
        } else {
            Catch::new(CatchKind::BraceEscape)
        }
    }

    /// Abandon the current catch, returning its prefix and content to the
    /// parent as plain content.
    fn give_back(&mut self) {
        let mut catch = self.pop_catch();
        let mut items = std::mem::take(&mut catch.prefix);
        items.append(&mut catch.content);
        push_all(&mut self.top().content, items);
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    fn open_block(
        &mut self,
        page: &mut Page,
        next: Option<char>,
        next2: Option<char>,
    ) -> Result<(), ParseError> {
        let open_pos = self.pos;
        let mut header = BlockHeader::default();

        if next == Some('@') {
            self.skip += 1;
            header.typ = "variable".to_string();
        } else {
            let top = self.top();
            match top.last_text() {
                Some(text) => {
                    header = scan_block_header(text);
                    let keep = text.len() - header.consumed;
                    if let Some(PosContent {
                        content: Content::Text(text),
                        ..
                    }) = top.content.last_mut()
                    {
                        text.truncate(keep);
                        if text.is_empty() {
                            top.content.pop();
                        }
                    }
                }
                None if !top.content.is_empty() => {
                    return Err(ParseError::NoBlockType { pos: open_pos });
                }
                None => {}
            }
        }

        let mut typ = header.typ;
        let mut classes = Vec::new();
        if typ.contains('.') {
            let mut parts = typ.split('.').map(str::to_string);
            let first = parts.next().unwrap_or_default();
            classes = parts.filter(|class| !class.is_empty()).collect();
            typ = first;
        }

        let mut name = header.name;
        if typ.is_empty() {
            typ = if matches!(page.tree.get(self.block).kind, BlockKind::Infobox(_)) {
                "infosec".to_string()
            } else if !name.is_empty() {
                "sec".to_string()
            } else {
                "map".to_string()
            };
        }
        if let Some(model) = typ.strip_prefix('$') {
            name = model.to_string();
            typ = "model".to_string();
        }

        let id = page
            .tree
            .create(&typ, &name, &header.heading_id, classes, Some(self.block), open_pos);
        trace!(block = %page.tree.get(id).describe(), pos = %open_pos, "block opened");
        self.block = id;
        self.depth += 1;
        self.catches.push(Catch::new(CatchKind::Block(id)));

        if next == Some('{') {
            self.brace_level += 1;
            self.skip += 1;
            if next2.is_some_and(|c| c == ' ' || c == '\t' || c == '\n') {
                self.skip += 1;
            }
            self.catches.push(Catch::new(CatchKind::BraceEscape));
        }

        self.next_char('{');
        Ok(())
    }

    /// Close the innermost block, delivering it (or, for conditionals and
    /// variable blocks, what it stands for) to the enclosing catch.
    fn close_block(&mut self, page: &mut Page, close_pos: Position) {
        let id = self.block;
        let catch = self.pop_catch();
        let content = catch.content;

        let block = page.tree.get(id);
        let (open_pos, scope, parent) = (block.open_pos, block.scope, block.parent);
        let name = block.name.trim().to_string();
        trace!(block = %block.describe(), pos = %close_pos, "block closed");

        match block.kind {
            BlockKind::Conditional(Conditional::If) => {
                self.conditional_exists = true;
                self.conditional = condition(page, scope, &name, "if", open_pos);
                if self.conditional {
                    self.splice(page, parent, content);
                }
            }
            BlockKind::Conditional(Conditional::Elsif) => {
                if !self.conditional_exists {
                    page.warn(open_pos, "Unexpected elsif{}");
                } else if !self.conditional {
                    self.conditional = condition(page, scope, &name, "elsif", open_pos);
                    if self.conditional {
                        self.splice(page, parent, content);
                    }
                }
            }
            BlockKind::Conditional(Conditional::Else) => {
                if !self.conditional_exists {
                    page.warn(open_pos, "Unexpected else{}");
                } else {
                    if !name.is_empty() {
                        page.warn(open_pos, "Condition on else{} ignored");
                    }
                    if !self.conditional {
                        self.splice(page, parent, content);
                    }
                }
                self.conditional_exists = false;
            }
            BlockKind::Variable => {
                let var_name = if name.is_empty() {
                    content
                        .iter()
                        .filter_map(|pc| match &pc.content {
                            Content::Text(text) => Some(text.as_str()),
                            Content::Block(_) => None,
                        })
                        .collect::<String>()
                        .trim()
                        .to_string()
                } else {
                    name
                };
                match page.try_lookup(scope, &var_name) {
                    Ok(Some(Value::Block(found))) => {
                        page.tree.get_mut(found).parent = parent;
                        self.top().content.push(PosContent::block(found, open_pos));
                    }
                    Ok(Some(_)) => {
                        page.warn(open_pos, format!("Variable block @{} does not contain a block", var_name))
                    }
                    Ok(None) => page.warn(open_pos, format!("Variable block @{} does not exist", var_name)),
                    Err(err) => page.warn(open_pos, err.to_string()),
                }
            }
            _ => {
                page.tree.get_mut(id).content = content;
                self.top().content.push(PosContent::block(id, open_pos));
            }
        }

        page.tree.get_mut(id).close_pos = close_pos;
        self.block = parent.unwrap_or(BlockId::MAIN);
        self.depth = self.depth.saturating_sub(1);
    }

    /// Move a taken branch's content into the enclosing catch, adopting its
    /// blocks into the conditional's parent.
    fn splice(&mut self, page: &mut Page, parent: Option<BlockId>, content: Vec<PosContent>) {
        for pc in &content {
            if let Content::Block(child) = pc.content {
                page.tree.get_mut(child).parent = parent;
            }
        }
        push_all(&mut self.top().content, content);
    }

    // -----------------------------------------------------------------------
    // Main-level assignments
    // -----------------------------------------------------------------------

    fn assignment_char(&mut self, page: &mut Page, c: char, next: Option<char>) -> Result<(), ParseError> {
        let kind = self.top().kind;
        let at_block = kind == CatchKind::Block(self.block);

        if at_block && (c == '@' || c == '%') && (!self.line_started || self.assignment.negated) {
            self.assignment.raw = c == '%';
            let mut catch = Catch::new(CatchKind::VariableName);
            let prefix = if self.assignment.negated { format!("-{}", c) } else { c.to_string() };
            catch.prefix = vec![PosContent::text(prefix, self.pos)];
            self.catches.push(catch);
            self.next_char(c);
            return Ok(());
        }

        if at_block && c == '-' && !self.line_started && matches!(next, Some('@' | '%')) {
            self.assignment.negated = true;
            self.next_char(c);
            return Ok(());
        }

        match (c, kind) {
            (':', CatchKind::VariableName) => {
                let catch = self.pop_catch();
                self.assignment.name = catch.last_text().unwrap_or_default().to_string();
                self.catches.push(Catch::new(CatchKind::VariableValue));
            }
            (';', CatchKind::VariableName) => {
                let catch = self.pop_catch();
                let name = catch.last_text().unwrap_or_default().to_string();
                if name.is_empty() {
                    page.warn(self.pos, "variable has no name");
                } else if let Err(err) = page.assign(&name, Value::Bool(!self.assignment.negated)) {
                    page.warn(self.pos, err.to_string());
                }
                self.assignment = Assignment::default();
            }
            (';', CatchKind::VariableValue) => {
                let catch = self.pop_catch();
                self.finish_assignment(page, catch.content);
                self.assignment = Assignment::default();
            }
            _ => return self.handle_char(c),
        }
        self.next_char(c);
        Ok(())
    }

    fn finish_assignment(&mut self, page: &mut Page, content: Vec<PosContent>) {
        let name = std::mem::take(&mut self.assignment.name);
        if name.is_empty() {
            page.warn(self.pos, "variable has no name");
            return;
        }

        let scope = page.tree.root_scope();
        let raw = self.assignment.raw;
        let pos = content.first().map(|pc| pc.pos).unwrap_or(self.pos);
        let values = content
            .into_iter()
            .map(|pc| match pc.content {
                Content::Text(text) => Value::Str(text),
                Content::Block(id) => Value::Block(id),
            })
            .collect();
        let value = fix_for_storage(values, |text| {
            if raw {
                Value::Str(text.to_string())
            } else {
                Value::Html(format_text(page, scope, text, FmtOpts::at(pos)))
            }
        });

        let value = match value {
            Some(Value::Seq(_)) => {
                page.warn(pos, format!("Variable @{} contains both text and blocks", name));
                return;
            }
            Some(Value::Block(id)) => {
                block::parse(page, id);
                Value::Block(id)
            }
            Some(value) => value,
            None => Value::Str(String::new()),
        };
        if let Err(err) = page.assign(&name, value) {
            page.warn(pos, err.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // End of input
    // -----------------------------------------------------------------------

    /// Close whatever is still open and hand the main block its content.
    pub(crate) fn finish(mut self, page: &mut Page) {
        let end = self.pos;
        while self.catches.len() > 1 {
            match self.top().kind {
                CatchKind::BraceEscape => {
                    let raw = self.pop_catch();
                    push_all(&mut self.top().content, raw.content);
                    self.brace_level = 0;
                }
                CatchKind::VariableName => self.give_back(),
                CatchKind::VariableValue => {
                    self.pop_catch();
                    let name = std::mem::take(&mut self.assignment.name);
                    page.warn(end, format!("Value for variable @{} not terminated", name));
                }
                CatchKind::Block(id) => {
                    let block = page.tree.get(id);
                    if matches!(block.kind, BlockKind::Conditional(_) | BlockKind::Variable) {
                        let message = format!("{} not closed before end of input", block.describe());
                        let pos = block.open_pos;
                        page.warn(pos, message);
                    } else {
                        page.tree.get_mut(id).unclosed = true;
                    }
                    self.close_block(page, end);
                }
            }
        }

        let main = self.pop_main();
        page.tree.get_mut(BlockId::MAIN).content = main.content;
        page.tree.get_mut(BlockId::MAIN).close_pos = end;
    }

    fn pop_main(&mut self) -> Catch {
        self.catches
            .pop()
            .unwrap_or_else(|| Catch::new(CatchKind::Block(BlockId::MAIN)))
    }
}

fn is_variable_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn is_type_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$' | '.')
}

/// Scan `text` backward from its end for `type [name] #heading#`.
///
/// Scanning stops at whitespace once a type has been seen, after a `~`
/// that terminates the type, or before the first character that cannot
/// belong to the header.
fn scan_block_header(text: &str) -> BlockHeader {
    let mut header = BlockHeader::default();
    let mut name_depth = 0usize;
    let mut in_heading_id = false;

    for (index, c) in text.char_indices().rev() {
        let consumed = text.len() - index;

        if c == ']' && header.typ.is_empty() {
            name_depth += 1;
            if name_depth == 1 {
                in_heading_id = false;
                header.consumed = consumed;
                continue;
            }
        } else if c == '[' && name_depth > 0 {
            name_depth -= 1;
            if name_depth == 0 {
                header.consumed = consumed;
                continue;
            }
        } else if c == '#' && name_depth == 0 && header.name.is_empty() && header.typ.is_empty() {
            in_heading_id = header.heading_id.is_empty();
            header.consumed = consumed;
            continue;
        }

        if name_depth > 0 {
            header.name.insert(0, c);
        } else if in_heading_id {
            if c != ' ' && c != '\t' {
                header.heading_id.insert(0, c);
            }
        } else if is_type_char(c) {
            header.typ.insert(0, c);
        } else if c == '~' && !header.typ.is_empty() {
            header.consumed = consumed;
            break;
        } else if c.is_whitespace() && header.typ.is_empty() {
            // between the name and the brace
        } else {
            break;
        }
        header.consumed = consumed;
    }
    header
}

/// Evaluate an `if`/`elsif` condition: `@var`, or `!@var` to negate.
fn condition(page: &mut Page, scope: ScopeId, cond: &str, typ: &str, pos: Position) -> bool {
    let cond = cond.trim();
    if cond.is_empty() {
        page.warn(pos, format!("Conditional {}{{}} has no condition", typ));
        return false;
    }
    if let Some(negated) = cond.strip_prefix('!') {
        return !condition(page, scope, negated, typ, pos);
    }
    let Some(name) = cond.strip_prefix('@') else {
        let message = format!("Invalid {}{{}} condition; expected variable or attribute", typ);
        page.warn(pos, message);
        return false;
    };
    match page.try_lookup(scope, name) {
        Ok(Some(value)) => value.is_truthy(),
        Ok(None) => false,
        Err(err) => {
            page.warn(pos, err.to_string());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(text: &str) -> (String, String, String, String) {
        let h = scan_block_header(text);
        let keep = text[..text.len() - h.consumed].to_string();
        (h.typ, h.name, h.heading_id, keep)
    }

    #[test]
    fn type_and_name() {
        assert_eq!(
            header("intro text\nsec [Early life] "),
            ("sec".into(), "Early life".into(), "".into(), "intro text\n".into())
        );
    }

    #[test]
    fn nested_brackets_stay_in_name() {
        let (typ, name, _, _) = header("sec [The [b]bold[/b] part]");
        assert_eq!(typ, "sec");
        assert_eq!(name, "The [b]bold[/b] part");
    }

    #[test]
    fn heading_id() {
        let (typ, name, id, _) = header("sec [Title] #custom-id# ");
        assert_eq!((typ.as_str(), name.as_str(), id.as_str()), ("sec", "Title", "custom-id"));
    }

    #[test]
    fn tilde_terminates_type() {
        assert_eq!(
            header("word~code"),
            ("code".into(), "".into(), "".into(), "word".into())
        );
    }

    #[test]
    fn stops_at_foreign_character() {
        assert_eq!(
            header("key: "),
            ("".into(), "".into(), "".into(), "key:".into())
        );
    }

    #[test]
    fn classes_and_models_scan_as_type() {
        assert_eq!(header("p.lead.wide").0, "p.lead.wide");
        assert_eq!(header("$infobox_person ").0, "$infobox_person");
    }
}

use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use wikifier::block::{Content, PosContent};
use wikifier::opts::SizeMethod;
use wikifier::{
    BlockId, ImageDimensions, ImageSizer, LinkResolver, ModelSource, Page, PageOpts, ParseError,
    Value, scale_dimensions,
};

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn parse_page(source: &str) -> Page {
    let mut page = Page::new(source);
    page.parse().unwrap();
    page
}

fn render(source: &str) -> String {
    parse_page(source).html().into_string()
}

fn warnings_of(page: &Page) -> Vec<String> {
    page.warnings().iter().map(|w| w.message.clone()).collect()
}

/// The only child block of main.
fn only_child(page: &Page) -> BlockId {
    let children: Vec<BlockId> = page.tree().get(BlockId::MAIN).child_blocks().collect();
    assert_eq!(children.len(), 1, "main children: {}", page.hierarchy());
    children[0]
}

struct Models;

impl ModelSource for Models {
    fn model_source(&self, name: &str) -> Option<String> {
        match name {
            "greeting" => Some("@page.title: Greeting;\nHello, [@m.name]!\n".to_string()),
            "loop" => Some("$loop {}\n".to_string()),
            _ => None,
        }
    }
}

struct Links;

impl LinkResolver for Links {
    fn page_exists(&self, name: &str) -> bool {
        name == "Home"
    }

    fn category_exists(&self, _name: &str) -> bool {
        false
    }
}

/// Every image is 400x300.
struct Sizer;

impl ImageSizer for Sizer {
    fn dimensions(&self, _file: &str, width: u32, height: u32) -> ImageDimensions {
        scale_dimensions(400, 300, width, height)
    }

    fn sized_path(&self, file: &str, width: u32, height: u32) -> String {
        format!("/images/{}x{}-{}", width, height, file)
    }
}

// ----------------------------------------------------------------------------
// Lexing
// ----------------------------------------------------------------------------

#[test]
fn parse_twice_changes_nothing() {
    let mut page = Page::new("{ x: 1; x: 2; }\nsec [A] {\ntext");
    page.parse().unwrap();
    let warnings = warnings_of(&page);
    let blocks = page.tree().len();
    let hierarchy = page.hierarchy();

    page.parse().unwrap();
    assert_eq!(warnings_of(&page), warnings);
    assert_eq!(page.tree().len(), blocks);
    assert_eq!(page.hierarchy(), hierarchy);
}

#[test]
fn escaped_control_characters_are_literal() {
    let html = render(r"\{ \} \[ \] \; \:");
    assert!(html.contains("{ } [ ] ; :"), "{}", html);
}

#[test]
fn comments_are_stripped() {
    let mut page = parse_page("A/*B*/C");
    assert!(page.html().as_str().contains("AC"));
    assert!(page.warnings().is_empty());

    let mut nested = parse_page("A/*B/*C*/D*/E");
    let html = nested.html().into_string();
    assert!(html.contains("AE"), "{}", html);
    assert!(!html.contains('D'));
}

#[test]
fn untyped_block_is_a_map() {
    let page = parse_page("{ a: 1; }");
    let block = page.tree().get(only_child(&page));
    assert_eq!(block.block_type(), "map");

    let map = block.kind().map().unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.get_str("a"), Some("1"));
}

#[test]
fn colliding_keys_are_renamed() {
    let page = parse_page("{ x: 1; x: 2; }");
    let map = page.tree().get(only_child(&page)).kind().map().unwrap();

    let keys: Vec<&str> = map.keys().collect();
    assert_eq!(keys, vec!["x", "x_2"]);
    assert_eq!(map.entry("x").unwrap().key_title, "x");
    assert_eq!(map.entry("x_2").unwrap().key_title, "x");
    assert_eq!(map.get_str("x_2"), Some("2"));
    assert_eq!(page.warnings().len(), 1);
}

#[test]
fn brace_escape_keeps_raw_text() {
    let page = parse_page("~code{{ if (a{1}) {b} }}");
    let block = page.tree().get(only_child(&page));
    assert_eq!(block.block_type(), "code");
    assert_eq!(block.child_blocks().count(), 0);

    let text: Vec<&str> = block
        .content()
        .iter()
        .map(|pc| match &pc.content {
            Content::Text(text) => text.as_str(),
            Content::Block(_) => panic!("unexpected block"),
        })
        .collect();
    assert_eq!(text, vec!["if (a{1}) {b} "]);
    assert_eq!(page.tree().len(), 2);
}

#[test]
fn block_header_with_classes_and_name() {
    let page = parse_page("sec.wide.dark [Early life] {\nText\n}");
    let block = page.tree().get(only_child(&page));
    assert_eq!(block.block_type(), "sec");
    assert_eq!(block.name(), "Early life");
    assert_eq!(block.classes(), ["wide".to_string(), "dark".to_string()]);
}

#[test]
fn aliases_resolve() {
    let page = parse_page("section [A] {\nx\n}");
    assert_eq!(page.tree().get(only_child(&page)).block_type(), "sec");
}

#[test]
fn content_positions() {
    let page = parse_page("line one\nmap {\n  k: v;\n}");
    let main = page.tree().get(BlockId::MAIN);
    let blocks: Vec<&PosContent> = main
        .content()
        .iter()
        .filter(|pc| matches!(pc.content, Content::Block(_)))
        .collect();
    assert_eq!(blocks.len(), 2);
    let map = blocks[1];
    assert_eq!((map.pos.line, map.pos.column), (2, 5));
}

#[test]
fn closing_main_is_fatal() {
    let mut page = Page::new("text\n}\n");
    let err = page.parse().unwrap_err();
    assert!(matches!(err, ParseError::CloseMainBlock { .. }));
    assert_eq!(err.position().map(|p| p.line), Some(2));
}

#[test]
fn block_without_type_after_block_is_fatal() {
    let mut page = Page::new("map {}{ }");
    assert!(matches!(page.parse(), Err(ParseError::NoBlockType { .. })));
}

#[test]
fn unclosed_block_warns() {
    let page = parse_page("sec [A] {\ntext");
    assert_eq!(warnings_of(&page), vec!["sec[A]{} not closed before end of input".to_string()]);
}

#[test]
fn unterminated_value_warns_once() {
    let page = parse_page("{ key: value");
    let warnings = warnings_of(&page);
    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert!(warnings[0].contains("not terminated"));
    assert!(warnings[0].contains("key"));
    assert!(warnings[0].contains("value"));
}

#[test]
fn unknown_block_warns() {
    let mut page = parse_page("wat {\nsomething\n}");
    assert_eq!(warnings_of(&page), vec!["Unknown block type wat{}".to_string()]);
    assert!(!page.html().as_str().contains("something"));
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

#[test]
fn formatter_static_tokens() {
    let html = render("Hello [b]world[/b].");
    assert!(html.contains(r#"Hello <span style="font-weight: bold;">world</span>."#), "{}", html);
}

#[test]
fn list_items_in_order() {
    let html = render("list { one; two; three; }");
    assert_eq!(html.matches("<li").count(), 3);
    let one = html.find("one").unwrap();
    let two = html.find("two").unwrap();
    let three = html.find("three").unwrap();
    assert!(one < two && two < three);
    assert!(html.contains(r#"<ul class="q-list">"#));
}

#[test]
fn numbered_list_is_ordered() {
    let html = render("numlist { a; b; }");
    assert!(html.contains(r#"<ol class="q-numlist">"#), "{}", html);
}

#[test]
fn blank_lines_split_paragraphs() {
    let html = render("One\n\nTwo");
    assert_eq!(html.matches(r#"<p class="q-p">"#).count(), 2, "{}", html);
}

#[test]
fn sections_and_headings() {
    let html = render("-@page.enable.title;\nsec [First Part] {\nA\n}\nsec [First Part] {\nB\n}");
    assert!(html.contains(r#"<h1 class="q-sec-title" id="qa-First_Part">"#), "{}", html);
    assert!(html.contains(r#"id="qa-First_Part-2""#), "{}", html);
}

#[test]
fn nested_sections_increase_level() {
    let html = render("-@page.enable.title;\nsec [Outer] {\nsec [Inner] {\nx\n}\n}");
    assert!(html.contains("<h1 class=\"q-sec-title\" id=\"qa-Outer\">"));
    assert!(html.contains("<h2 class=\"q-sec-title\" id=\"qa-Inner\">"));
}

#[test]
fn intro_section_uses_page_title() {
    let mut page = parse_page("@page.title: My [i]Page[/i];\nWelcome.");
    assert_eq!(page.title(), "My Page");
    let html = page.html().into_string();
    assert!(html.contains("<h1"), "{}", html);
    assert!(html.contains(r#"My <span style="font-style: italic;">Page</span>"#));
    assert!(html.contains("Welcome."));
}

#[test]
fn toc_lists_sections() {
    let html = render("-@page.enable.title;\ntoc {}\nsec [One] {\nA\n}\nsec [Two] {\nB\n}");
    assert!(html.contains("<strong>Contents</strong>"));
    assert!(html.contains(r##"href="#qa-One""##), "{}", html);
    assert!(html.contains(r##"href="#qa-Two""##));
}

#[test]
fn style_generates_scoped_css() {
    let mut page = parse_page("sec [Intro] {\n    style { color: red; }\n    Hello\n}");
    assert_eq!(page.css(), ".q-main-1 .q-sec-1 {\n    color: red;\n}\n");
    assert!(page.html().as_str().contains("q-sec-1"));
}

#[test]
fn infobox_renders_table() {
    let html = render("infobox [Facts] {\n    Born: 1990;\n}");
    assert!(html.contains(r#"<table class="q-infobox">"#), "{}", html);
    assert!(html.contains("Facts"));
    assert!(html.contains("Born"));
    assert!(html.contains("1990"));
}

#[test]
fn infosec_outside_infobox_warns() {
    let page = parse_page("infosec [Alone] {\n    a: b;\n}");
    assert_eq!(
        warnings_of(&page),
        vec!["infosec{} outside of infobox{} does nothing".to_string()]
    );
}

#[test]
fn code_block_escapes_text() {
    let html = render("code {{\n<b>&</b>\n}}");
    assert!(html.contains("&lt;b&gt;&amp;&lt;/b&gt;"), "{}", html);
    assert!(html.contains("<pre"));
}

#[test]
fn html_block_passes_through() {
    let html = render("html {{<em>raw</em>}}");
    assert!(html.contains("<em>raw</em>"), "{}", html);
}

// ----------------------------------------------------------------------------
// Variables and control flow
// ----------------------------------------------------------------------------

#[test]
fn page_variables() {
    let page = parse_page(
        "@page.author: Ann;\n%page.raw: [b]x[/b];\n@page.draft;\n-@page.generated;\n",
    );
    assert_eq!(page.author(), "Ann");
    assert_eq!(page.get("page.raw").unwrap(), Some(Value::Str("[b]x[/b]".to_string())));
    assert!(page.draft());
    assert!(!page.generated());
    assert_eq!(page.get_bool("page.generated"), Some(false));
}

#[test]
fn variables_interpolate() {
    let html = render("@name: World;\nHello [@name].");
    assert!(html.contains("Hello World."), "{}", html);
}

#[test]
fn at_sign_mid_line_is_text() {
    let mut page = parse_page("Mail me at a@b.com; thanks");
    assert!(page.get("b.com").unwrap().is_none());
    assert!(page.html().as_str().contains("a@b.com; thanks"));
}

#[test]
fn empty_variable_name_warns() {
    let page = parse_page("@: x;\n");
    assert_eq!(warnings_of(&page), vec!["variable has no name".to_string()]);
}

#[test]
fn undefined_variable_warns() {
    let mut page = parse_page("Hi [@nobody].");
    let html = page.html().into_string();
    assert_eq!(warnings_of(&page), vec!["Variable @nobody is not defined".to_string()]);
    assert!(html.contains("Hi ."));
}

#[test]
fn conditionals_choose_one_branch() {
    let html = render("@show;\nif [@show] {\nShown text\n}\nelse {\nHidden text\n}");
    assert!(html.contains("Shown text"));
    assert!(!html.contains("Hidden text"));

    let html = render("if [@missing] {\nNo\n}\nelsif [!@missing] {\nYes\n}\nelse {\nNever\n}");
    assert!(html.contains("Yes"));
    assert!(!html.contains("No\n") && !html.contains("Never"));
}

#[test]
fn stray_else_warns() {
    let page = parse_page("else {\nx\n}");
    assert_eq!(warnings_of(&page), vec!["Unexpected else{}".to_string()]);
}

#[test]
fn variable_block_inserts_stored_block() {
    let html = render("@box: infobox [Facts] { Born: 1990; };\n{@box}");
    assert!(html.contains("<table"), "{}", html);
    assert!(html.contains("1990"));

    let page = parse_page("{@nothing}");
    assert_eq!(warnings_of(&page), vec!["Variable block @nothing does not exist".to_string()]);
}

#[test]
fn for_loop_renders_each_item() {
    let html = render("@fruits: list { apple; banana; };\nfor [@fruits as fruit] {\nI like [@fruit].\n}");
    assert!(html.contains("I like apple."), "{}", html);
    assert!(html.contains("I like banana."));
    assert!(html.find("apple").unwrap() < html.find("banana").unwrap());
}

#[test]
fn for_loop_formats_list_items_per_item() {
    let page_src = "@fruits: list { apple; banana; };\nfor [@fruits as f] {\nlist { [@f]; }\n}";
    let mut page = parse_page(page_src);
    let html = page.html().into_string();
    assert_eq!(warnings_of(&page), Vec::<String>::new());
    assert_eq!(html.matches(r#"<li class="q-list-item">"#).count(), 2, "{}", html);
    assert!(html.find("apple").unwrap() < html.find("banana").unwrap(), "{}", html);
}

#[test]
fn for_loop_titles_sections_per_item() {
    let mut page = parse_page(
        "@fruits: list { apple; banana; };\nsec [Fruit] {\nintro\n}\nfor [@fruits as f] {\nsec [[@f]] {\nbody [@f]\n}\n}",
    );
    let html = page.html().into_string();
    assert_eq!(warnings_of(&page), Vec::<String>::new());
    assert!(html.contains(r#"id="qa-apple">"#), "{}", html);
    assert!(html.contains(r#"id="qa-banana">"#), "{}", html);
    assert!(html.contains("body apple"));
    assert!(html.contains("body banana"));
}

#[test]
fn for_loop_fills_infobox_per_item() {
    let mut page = parse_page(
        "@fruits: list { apple; banana; };\nfor [@fruits as f] {\ninfobox [[@f]] {\nName: [@f];\n}\n}",
    );
    let html = page.html().into_string();
    assert_eq!(warnings_of(&page), Vec::<String>::new());
    assert_eq!(html.matches("<table").count(), 2, "{}", html);
    assert!(html.matches("apple").count() >= 2, "{}", html);
    assert!(html.matches("banana").count() >= 2, "{}", html);
}

#[test]
fn for_loop_resolves_image_per_item() {
    let mut page = parse_page("@fruits: list { apple; banana; };\nfor [@fruits as f] {\nimage { file: [@f].png; }\n}");
    let html = page.html().into_string();
    assert_eq!(warnings_of(&page), Vec::<String>::new());
    assert!(html.contains(r#"src="/images/apple.png""#), "{}", html);
    assert!(html.contains(r#"src="/images/banana.png""#), "{}", html);
}

#[test]
fn for_loop_reports_body_warning_once() {
    let mut page = parse_page("@fruits: list { apple; banana; };\nfor [@fruits as f] {\n[@f][wat]\n}");
    page.html();
    assert_eq!(warnings_of(&page), vec!["Unknown format token [wat]".to_string()]);
}

#[test]
fn for_loop_over_missing_iterable_warns() {
    let mut page = parse_page("for [@none] {\nx\n}");
    page.html();
    assert_eq!(warnings_of(&page), vec!["for{} iterable @none is not defined".to_string()]);
}

// ----------------------------------------------------------------------------
// Links, images, models
// ----------------------------------------------------------------------------

#[test]
fn links_check_existence() {
    let mut page = Page::new("[[Home]] and [[Nowhere]]");
    page.set_links(Arc::new(Links));
    page.parse().unwrap();
    let html = page.html().into_string();
    assert!(html.contains(r#"<a class="q-link-internal" href="/page/Home" title="Home">Home</a>"#), "{}", html);
    assert!(html.contains(r#"class="q-link-internal invalid" href="/page/Nowhere""#));
}

#[test]
fn legacy_links_convert() {
    let html = render("[!Rust!] and [$https://example.com$]");
    assert!(html.contains(r#"href="http://en.wikipedia.org/wiki/Rust""#), "{}", html);
    assert!(html.contains(r#"class="q-link-other" href="https://example.com""#));
}

#[test]
fn javascript_image() {
    let html = render("image { file: cat.png; width: 100; }");
    assert!(html.contains(r#"src="/images/cat.png""#), "{}", html);
}

#[test]
fn server_image_is_sized_and_recorded() {
    let mut opts = PageOpts::default();
    opts.image.size_method = SizeMethod::Server;
    let mut page = Page::with_opts("image { file: cat.png; width: 100; }", opts);
    page.set_sizer(Arc::new(Sizer));
    page.parse().unwrap();

    let html = page.html().into_string();
    assert!(html.contains(r#"src="/images/100x75-cat.png""#), "{}", html);
    assert!(html.contains("srcset="));
    assert_eq!(page.images().get("cat.png"), Some(&vec![[100, 75]]));
}

#[test]
fn server_image_records_every_use() {
    let mut opts = PageOpts::default();
    opts.image.size_method = SizeMethod::Server;
    let mut page = Page::with_opts(
        "image { file: cat.png; width: 100; }\nimage { file: cat.png; width: 100; }\nimage { file: cat.png; }",
        opts,
    );
    page.set_sizer(Arc::new(Sizer));
    page.parse().unwrap();
    assert_eq!(
        page.images().get("cat.png"),
        Some(&vec![[100, 75], [100, 75], [400, 300]])
    );
}

#[test]
fn server_image_without_sizer_warns() {
    let mut opts = PageOpts::default();
    opts.image.size_method = SizeMethod::Server;
    let mut page = Page::with_opts("image { file: cat.png; }", opts);
    page.parse().unwrap();
    assert_eq!(page.warnings().len(), 1);
    assert!(!page.html().as_str().contains("cat.png"));
}

#[test]
fn models_render_with_arguments() {
    let mut page = Page::new("$greeting { name: Ann; }");
    page.set_model_source(Arc::new(Models));
    page.parse().unwrap();

    let html = page.html().into_string();
    assert!(html.contains("Hello, Ann!"), "{}", html);
    assert!(html.contains("q-model-greeting"));
    let info = page.models().get("greeting").unwrap();
    assert_eq!(info.title, "Greeting");
    assert_eq!(info.file, "greeting.model");
}

#[test]
fn missing_and_recursive_models_warn() {
    let mut page = Page::new("$nope {}\n");
    page.set_model_source(Arc::new(Models));
    page.parse().unwrap();
    assert_eq!(warnings_of(&page), vec!["Model $nope{} does not exist".to_string()]);

    let mut page = Page::new("$loop {}\n");
    page.set_model_source(Arc::new(Models));
    page.parse().unwrap();
    assert!(warnings_of(&page).iter().any(|w| w.contains("nested too deeply")));
}

#[test]
fn deep_nesting_is_capped() {
    let depth = 500;
    let source = format!("{}{}", "sec {".repeat(depth), "}".repeat(depth));
    let mut page = parse_page(&source);
    assert_eq!(page.tree().descendants(BlockId::MAIN).len(), 64);
    assert_eq!(warnings_of(&page), vec!["Blocks nested more than 64 deep".to_string()]);

    let html = page.html().into_string();
    assert!(html.contains("sec {sec {"));
    assert!(html.contains("}}}"));
}

// ----------------------------------------------------------------------------
// Page surface
// ----------------------------------------------------------------------------

#[test]
fn vars_only_skips_block_parsing() {
    let mut page = Page::new("@page.title: Quick;\nsec [X] {\nbody\n}").vars_only();
    page.parse().unwrap();
    assert_eq!(page.title(), "Quick");
    let sec = only_child(&page);
    assert!(!page.tree().get(sec).is_parsed());
}

#[test]
fn page_info_serializes() {
    let mut page = parse_page(
        "@page.title: Info;\n@page.desc: About things;\n@category.news;\n@category.misc;\ntext",
    );
    assert_eq!(page.categories(), vec!["news".to_string(), "misc".to_string()]);

    let json = serde_json::to_value(page.info()).unwrap();
    assert_eq!(json["title"], "Info");
    assert_eq!(json["description"], "About things");
    assert_eq!(json["categories"][1], "misc");
    assert!(json.get("draft").is_none());
}

#[test]
fn open_reads_from_disk() {
    let mut file = tempfile::Builder::new().suffix(".page").tempfile().unwrap();
    writeln!(file, "@page.title: On disk;\nStored text.").unwrap();

    let mut page = Page::open(file.path(), PageOpts::default()).unwrap();
    page.parse().unwrap();
    assert_eq!(page.title(), "On disk");
    assert!(page.name().ends_with(".page"));
    assert!(page.html().as_str().contains("Stored text."));
}

#[test]
fn open_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = Page::open(dir.path().join("missing.page"), PageOpts::default());
    assert!(matches!(result, Err(ParseError::Io(_))));
}

#[test]
fn html_is_cached() {
    let mut page = parse_page("@fruits: list { a; b; };\nfor [@fruits] {\n[@value]\n}");
    let first = page.html();
    let blocks = page.tree().len();
    assert_eq!(page.html(), first);
    assert_eq!(page.tree().len(), blocks);
}

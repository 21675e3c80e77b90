use criterion::{criterion_group, criterion_main, Criterion};

use formkeeper::derive::derive_selector;
use formkeeper::field::{find_fields, persist};
use formkeeper::{Document, PageRecord};
use url::Url;

// Run with: cargo bench --bench derive_bench

fn large_form(fields: usize) -> Document {
    let mut html = String::from(r#"<form id="survey">"#);
    for i in 0..fields {
        match i % 4 {
            0 => html.push_str(&format!(r#"<input type="text" name="q{}" value="answer {}">"#, i, i)),
            1 => html.push_str(&format!(r#"<textarea name="q{}">notes {}</textarea>"#, i, i)),
            2 => html.push_str(&format!(
                r#"<input type="radio" name="q{}" value="yes" checked><input type="radio" name="q{}" value="no">"#,
                i, i
            )),
            _ => html.push_str(&format!(
                r#"<select name="q{}"><option value="a">A</option><option value="b" selected>B</option></select>"#,
                i
            )),
        }
    }
    html.push_str("</form>");
    Document::parse(Url::parse("https://example.com/survey").unwrap(), &html)
}

fn bench_derive(c: &mut Criterion) {
    let doc = large_form(200);
    let body = doc.body().unwrap();
    let fields = find_fields(&doc, body);

    c.bench_function("derive_selector_200_fields", |b| {
        b.iter(|| {
            fields
                .iter()
                .filter_map(|(node, _)| derive_selector(&doc, *node))
                .count()
        })
    });

    c.bench_function("persist_page_200_fields", |b| {
        b.iter(|| {
            let mut record = PageRecord::default();
            for (node, kind) in &fields {
                if let Some(selector) = derive_selector(&doc, *node) {
                    persist(&doc, *node, *kind, &selector, &mut record);
                }
            }
            record.len()
        })
    });
}

criterion_group!(benches, bench_derive);
criterion_main!(benches);

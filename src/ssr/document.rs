//! HTML document patching: relocate head scripts, run the HTML hook, and
//! splice the root element (and sidecar payloads) into the document.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str, text};
use thiserror::Error;

use super::options::{ClientOptions, ServerOptions};
use super::sidecar::{Sidecars, escape_attribute};

const DOCTYPE_PREFIX: &[u8] = b"<!doctype";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to rewrite document: {message}")]
    Rewrite { message: String },
}

impl DocumentError {
    fn rewrite(err: impl std::fmt::Display) -> Self {
        Self::Rewrite {
            message: err.to_string(),
        }
    }
}

/// Whether `chunk` opens an HTML document.
pub fn is_document_start(chunk: &[u8]) -> bool {
    chunk
        .get(..DOCTYPE_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DOCTYPE_PREFIX))
}

/// Opening tag, markup and closing tag of the root element.
pub fn root_element(client: &ClientOptions, markup: &str) -> String {
    let tag = client.root_element_type.as_str();
    let mut attributes = String::new();
    if let Some(extra) = client.root_element_attributes.as_ref() {
        for (name, value) in extra.pairs() {
            attributes.push_str(&format!(r#" {name}="{}""#, escape_attribute(value)));
        }
    }

    format!(
        r#"<{tag} id="{}"{attributes}>{markup}</{tag}>"#,
        escape_attribute(&client.root_element)
    )
}

/// Apply the full patch sequence to a complete document.
pub fn patch_document(
    document: &str,
    markup: &str,
    sidecars: &Sidecars,
    client: &ClientOptions,
    server: &ServerOptions,
) -> Result<String, DocumentError> {
    let mut html = if server.dont_move_scripts {
        document.to_string()
    } else {
        move_head_scripts(document)?
    };

    if let Some(hook) = server.html_hook.as_ref() {
        html = hook(html);
    }

    splice_root(&html, &root_element(client, markup), &sidecars.to_html())
}

/// Move every `<script>` found in `<head>` to the end of `<body>`, keeping order.
pub fn move_head_scripts(document: &str) -> Result<String, DocumentError> {
    // Without a body the scripts would have nowhere to go.
    if !document.to_ascii_lowercase().contains("<body") {
        return Ok(document.to_string());
    }

    let scripts: Rc<RefCell<Vec<String>>> = Rc::default();

    rewrite_str(
        document,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("head script", {
                    let scripts = Rc::clone(&scripts);
                    move |el| {
                        let attributes = el
                            .attributes()
                            .iter()
                            .map(|attribute| (attribute.name(), attribute.value()))
                            .collect::<Vec<_>>();
                        scripts
                            .borrow_mut()
                            .push(open_tag(&el.tag_name(), &attributes));
                        el.remove_and_keep_content();
                        Ok(())
                    }
                }),
                text!("head script", {
                    let scripts = Rc::clone(&scripts);
                    move |t| {
                        if let Some(current) = scripts.borrow_mut().last_mut() {
                            current.push_str(t.as_str());
                        }
                        t.remove();
                        Ok(())
                    }
                }),
                element!("body", {
                    let scripts = Rc::clone(&scripts);
                    move |el| {
                        let moved: String = scripts
                            .borrow_mut()
                            .drain(..)
                            .map(|script| format!("{script}</script>"))
                            .collect();
                        if !moved.is_empty() {
                            el.append(&moved, ContentType::Html);
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(DocumentError::rewrite)
}

/// Insert `root` right after the body start tag and `sidecars` at the end of the head.
///
/// Documents without a head get the sidecars in front of the root element.
fn splice_root(document: &str, root: &str, sidecars: &str) -> Result<String, DocumentError> {
    let head_seen = Rc::new(Cell::new(false));
    let body_seen = Rc::new(Cell::new(false));

    rewrite_str(
        document,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("head", {
                    let head_seen = Rc::clone(&head_seen);
                    move |el| {
                        if head_seen.replace(true) {
                            return Ok(());
                        }
                        if !sidecars.is_empty() {
                            el.append(sidecars, ContentType::Html);
                        }
                        Ok(())
                    }
                }),
                element!("body", {
                    let head_seen = Rc::clone(&head_seen);
                    let body_seen = Rc::clone(&body_seen);
                    move |el| {
                        if body_seen.replace(true) {
                            return Ok(());
                        }
                        el.prepend(root, ContentType::Html);
                        if !head_seen.get() && !sidecars.is_empty() {
                            el.prepend(sidecars, ContentType::Html);
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(DocumentError::rewrite)
}

fn open_tag(name: &str, attributes: &[(String, String)]) -> String {
    let mut tag = format!("<{name}");
    for (attribute, value) in attributes {
        if value.is_empty() {
            tag.push_str(&format!(" {attribute}"));
        } else {
            tag.push_str(&format!(r#" {attribute}="{}""#, escape_attribute(value)));
        }
    }
    tag.push('>');
    tag
}

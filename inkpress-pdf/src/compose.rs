use std::collections::BTreeMap;
use std::mem;

use anyhow::{anyhow, bail, Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use inkpress_core::{DocumentMutator, LineDraw, MutableDocument, PhysicalSize, TextDraw};

use crate::page_sizes;

/// Resource name under which the annotation font is registered on each
/// page that receives text.
const INK_FONT: &str = "FInk";

/// Writes annotations into PDF content streams with lopdf. Drawing is
/// buffered per page; [`MutableDocument::serialize`] folds the buffer into
/// the document and emits the bytes.
#[derive(Debug, Default)]
pub struct LopdfMutator;

impl LopdfMutator {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentMutator for LopdfMutator {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn MutableDocument>> {
        let document = Document::load_mem(bytes).context("failed to parse document")?;
        let page_ids: Vec<ObjectId> = document
            .get_pages()
            .into_iter()
            .map(|(_, page_id)| page_id)
            .collect();
        let sizes = page_sizes(&document);
        debug!(bytes = bytes.len(), pages = page_ids.len(), "opened document for mutation");
        Ok(Box::new(LopdfDocument {
            document,
            page_ids,
            sizes,
            pending: BTreeMap::new(),
        }))
    }

    fn create(&self, pages: &[PhysicalSize]) -> Result<Box<dyn MutableDocument>> {
        if pages.is_empty() {
            bail!("cannot create a document with no pages");
        }

        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();

        let mut kids = Vec::with_capacity(pages.len());
        let mut page_ids = Vec::with_capacity(pages.len());
        for size in pages {
            let content_id = document.add_object(Stream::new(dictionary! {}, Vec::new()));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    Object::Real(size.width),
                    Object::Real(size.height),
                ],
                "Contents" => Object::Reference(content_id),
            });
            kids.push(Object::Reference(page_id));
            page_ids.push(page_id);
        }

        let count = pages.len() as i64;
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", Object::Reference(catalog_id));

        debug!(pages = pages.len(), "created blank document");
        Ok(Box::new(LopdfDocument {
            document,
            page_ids,
            sizes: pages.to_vec(),
            pending: BTreeMap::new(),
        }))
    }
}

struct LopdfDocument {
    document: Document,
    page_ids: Vec<ObjectId>,
    sizes: Vec<PhysicalSize>,
    pending: BTreeMap<ObjectId, Vec<Operation>>,
}

impl LopdfDocument {
    fn page(&self, page_index: usize) -> Result<ObjectId> {
        self.page_ids
            .get(page_index)
            .copied()
            .ok_or_else(|| anyhow!("page {} out of range", page_index))
    }
}

impl MutableDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_size(&self, page_index: usize) -> Option<PhysicalSize> {
        self.sizes.get(page_index).copied()
    }

    fn draw_text(&mut self, page_index: usize, text: &str, op: TextDraw) -> Result<()> {
        let page_id = self.page(page_index)?;
        let [r, g, b, _] = op.color.to_normalized();
        self.pending.entry(page_id).or_default().extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![INK_FONT.into(), op.size.into()]),
            Operation::new("Td", vec![op.at.x.into(), op.at.y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_line(&mut self, page_index: usize, op: LineDraw) -> Result<()> {
        let page_id = self.page(page_index)?;
        let [r, g, b, _] = op.color.to_normalized();
        self.pending.entry(page_id).or_default().extend([
            Operation::new("q", vec![]),
            Operation::new("RG", vec![r.into(), g.into(), b.into()]),
            Operation::new("w", vec![op.width.into()]),
            Operation::new("J", vec![1.into()]),
            Operation::new("j", vec![1.into()]),
            Operation::new("m", vec![op.from.x.into(), op.from.y.into()]),
            Operation::new("l", vec![op.to.x.into(), op.to.y.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn serialize(&mut self) -> Result<Vec<u8>> {
        let pending = mem::take(&mut self.pending);
        let mut font_id: Option<ObjectId> = None;

        for (page_id, appended) in pending {
            let needs_font = appended.iter().any(|op| op.operator == "Tf");

            // Shield the appended operators from whatever graphics state the
            // original content leaves behind.
            let existing = self.document.get_page_content(page_id).unwrap_or_default();
            let mut operations = Vec::new();
            if !existing.is_empty() {
                let decoded =
                    Content::decode(&existing).context("failed to decode page content")?;
                operations.push(Operation::new("q", vec![]));
                operations.extend(decoded.operations);
                operations.push(Operation::new("Q", vec![]));
            }
            operations.extend(appended);

            let encoded = Content { operations }
                .encode()
                .context("failed to encode page content")?;
            self.document
                .change_page_content(page_id, encoded)
                .context("failed to replace page content")?;

            if needs_font {
                let font_id = *font_id.get_or_insert_with(|| {
                    self.document.add_object(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => "Helvetica",
                    })
                });
                ensure_ink_font(&mut self.document, page_id, font_id)?;
            }
        }

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .context("failed to serialize document")?;
        debug!(bytes = output.len(), pages = self.page_ids.len(), "serialized document");
        Ok(output)
    }
}

/// Registers `font_id` as /FInk in the page's font resources, whatever
/// shape those resources currently have.
fn ensure_ink_font(document: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<()> {
    let resources_ref = document
        .get_dictionary(page_id)?
        .get(b"Resources")
        .ok()
        .and_then(|object| object.as_reference().ok());

    if resources_ref.is_none() {
        let page = document.get_object_mut(page_id)?.as_dict_mut()?;
        if page.get(b"Resources").is_err() {
            page.set("Resources", Dictionary::new());
        }
    }

    let font_ref = {
        let resources = match resources_ref {
            Some(id) => document.get_object(id)?.as_dict()?,
            None => document.get_dictionary(page_id)?.get(b"Resources")?.as_dict()?,
        };
        resources
            .get(b"Font")
            .ok()
            .and_then(|object| object.as_reference().ok())
    };

    if let Some(fonts_id) = font_ref {
        let fonts = document.get_object_mut(fonts_id)?.as_dict_mut()?;
        fonts.set(INK_FONT, Object::Reference(font_id));
        return Ok(());
    }

    let resources = match resources_ref {
        Some(id) => document.get_object_mut(id)?.as_dict_mut()?,
        None => document
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?
            .as_dict_mut()?,
    };
    match resources.get_mut(b"Font") {
        Ok(Object::Dictionary(fonts)) => {
            fonts.set(INK_FONT, Object::Reference(font_id));
        }
        _ => {
            let mut fonts = Dictionary::new();
            fonts.set(INK_FONT, Object::Reference(font_id));
            resources.set("Font", Object::Dictionary(fonts));
        }
    }
    Ok(())
}

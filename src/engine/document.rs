//! Page-oriented PDF operations.
//!
//! Structural work (page count, merge, extract, compress) is pure Rust via
//! `lopdf`. Rasterising a page needs a real renderer, so it binds PDFium
//! through `pdfium-render`.
//!
//! ## Why materialise inherited attributes?
//!
//! `Rotate`, `MediaBox`, `CropBox` and `Resources` may live on an ancestor
//! `Pages` node instead of the page itself. A page copied into a fresh page
//! tree loses its ancestors, so those values are written onto the page
//! before it moves. Otherwise a rotated or oddly-sized page would silently
//! come out upright or Letter-sized.
//!
//! ## Why spawn_blocking?
//!
//! Every function here is CPU-bound and synchronous; PDFium additionally
//! keeps thread-local state. Callers in [`crate::convert`] run them on the
//! blocking pool.

use crate::error::ConvertError;
use crate::spec::{PageSet, Rotation, MAX_OUTPUT_PIXELS};
use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENGINE: &str = "pdfium";

/// Page-tree keys whose values a page inherits from its ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Accepted render scales; 1.0 renders one pixel per PDF point (72 DPI).
pub const MIN_RENDER_SCALE: f32 = 0.25;
pub const MAX_RENDER_SCALE: f32 = 8.0;

/// What loading a document tells us up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub page_count: usize,
    /// Effective stored rotation of every page, in page order.
    pub page_rotations: Vec<Rotation>,
}

/// One document's contribution to a merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub name: &'a str,
    pub bytes: &'a [u8],
    pub pages: &'a PageSet,
}

/// Document engine. Holds only the PDFium location; every call is independent.
#[derive(Debug, Clone, Default)]
pub struct DocumentEngine {
    pdfium_path: Option<PathBuf>,
}

impl DocumentEngine {
    pub fn new(pdfium_path: Option<PathBuf>) -> Self {
        Self { pdfium_path }
    }

    // ── Structure ────────────────────────────────────────────────────────

    /// Parse the document and report its page count and stored rotations.
    pub fn load_metadata(&self, bytes: &[u8]) -> Result<DocumentMetadata, ConvertError> {
        let doc = load(bytes)?;
        let page_rotations = doc
            .get_pages()
            .values()
            .map(|&id| stored_rotation(&doc, id))
            .collect::<Vec<_>>();
        Ok(DocumentMetadata {
            page_count: page_rotations.len(),
            page_rotations,
        })
    }

    /// Concatenate the selected pages of every input, in input order.
    ///
    /// Within one input, pages keep ascending index order. Each page's
    /// rotation becomes `(stored + delta) mod 360`. Any failure discards the
    /// partially built output.
    pub fn build_merged(&self, inputs: &[MergeInput<'_>]) -> Result<Vec<u8>, ConvertError> {
        if inputs.is_empty() {
            return Err(ConvertError::DocumentOperation("nothing to merge".into()));
        }

        let mut dest = Document::with_version("1.5");
        let pages_id = dest.new_object_id();
        let mut kids = Vec::new();

        for input in inputs {
            input.pages.validate()?;
            let mut doc = load(input.bytes)?;
            doc.renumber_objects_with(dest.max_id + 1);

            let page_ids = doc.get_pages();
            for idx in input.pages.ascending() {
                let page_id = page_ids.get(&(idx as u32 + 1)).copied().ok_or_else(|| {
                    ConvertError::DocumentOperation(format!(
                        "'{}' has no page {} ({} pages)",
                        input.name,
                        idx + 1,
                        page_ids.len()
                    ))
                })?;
                adopt_page(&mut doc, page_id, pages_id, input.pages.rotation()).map_err(|e| {
                    ConvertError::DocumentOperation(format!(
                        "'{}' page {}: {e}",
                        input.name,
                        idx + 1
                    ))
                })?;
                kids.push(Object::Reference(page_id));
            }

            debug!("Copied {} page(s) from {}", input.pages.len(), input.name);
            dest.max_id = dest.max_id.max(doc.max_id);
            dest.objects.extend(doc.objects);
        }

        let count = kids.len() as i64;
        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Kids", Object::Array(kids));
        pages.set("Count", Object::Integer(count));
        dest.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = dest.add_object(catalog);
        dest.trailer.set("Root", Object::Reference(catalog_id));

        dest.prune_objects();
        dest.compress();
        info!("Merged {} document(s) into {} page(s)", inputs.len(), count);
        save(&mut dest)
    }

    /// Produce a standalone document holding just `pages` of `bytes`.
    pub fn extract_subset(
        &self,
        name: &str,
        bytes: &[u8],
        pages: &PageSet,
    ) -> Result<Vec<u8>, ConvertError> {
        self.build_merged(&[MergeInput { name, bytes, pages }])
    }

    /// Strip the document information dictionary and XMP metadata, drop
    /// unreferenced objects and compress streams.
    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let mut doc = load(bytes)?;
        doc.trailer.remove(b"Info");
        if let Ok(Object::Reference(root)) = doc.trailer.get(b"Root") {
            let root = *root;
            if let Ok(catalog) = doc.get_object_mut(root).and_then(Object::as_dict_mut) {
                catalog.remove(b"Metadata");
            }
        }
        doc.prune_objects();
        doc.compress();
        save(&mut doc)
    }

    // ── Rasterisation ────────────────────────────────────────────────────

    /// Bind the PDFium library.
    ///
    /// Tries the configured path, then `PDFIUM_LIB_PATH`, then the system
    /// library. Either path may name the library file or its directory.
    pub fn bind_pdfium(&self) -> Result<Pdfium, ConvertError> {
        let explicit = self
            .pdfium_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match &explicit {
            Some(path) => Pdfium::bind_to_library(library_file(path)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| {
            let at = explicit
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "system library".into());
            ConvertError::engine_unavailable(ENGINE, format!("{at}: {e}"))
        })?;
        Ok(Pdfium::new(bindings))
    }

    /// Render one page at `scale` with its stored rotation plus `delta`.
    pub fn rasterize_page(
        &self,
        bytes: &[u8],
        page_index: usize,
        delta: Rotation,
        scale: f32,
    ) -> Result<DynamicImage, ConvertError> {
        let pages = PageSet::with_pages(self.load_metadata(bytes)?.page_count, [page_index])?
            .with_rotation(delta);
        let mut rendered = self.rasterize_pages(bytes, &pages, scale)?;
        rendered
            .pop()
            .map(|(_, img)| img)
            .ok_or_else(|| ConvertError::RasterisationFailed {
                page: page_index + 1,
                detail: "no output".into(),
            })
    }

    /// Render every selected page, ascending, as `(index, image)` pairs.
    pub fn rasterize_pages(
        &self,
        bytes: &[u8],
        pages: &PageSet,
        scale: f32,
    ) -> Result<Vec<(usize, DynamicImage)>, ConvertError> {
        if !(MIN_RENDER_SCALE..=MAX_RENDER_SCALE).contains(&scale) {
            return Err(ConvertError::invalid_spec(format!(
                "render scale {scale} outside {MIN_RENDER_SCALE}..={MAX_RENDER_SCALE}"
            )));
        }
        pages.validate()?;

        let pdfium = self.bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| ConvertError::CorruptDocument(format!("{e:?}")))?;
        let doc_pages = document.pages();
        let total = doc_pages.len() as usize;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let mut out = Vec::with_capacity(pages.len());

        for idx in pages.ascending() {
            if idx >= total {
                return Err(ConvertError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("document has {total} pages"),
                });
            }
            let page = doc_pages
                .get(idx as u16)
                .map_err(|e| ConvertError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })?;

            let (w, h) = (
                f64::from(page.width().value * scale).ceil(),
                f64::from(page.height().value * scale).ceil(),
            );
            if w * h > MAX_OUTPUT_PIXELS as f64 {
                return Err(ConvertError::invalid_spec(format!(
                    "page {} at scale {scale} is {w}x{h} px, above the {} pixel limit",
                    idx + 1,
                    MAX_OUTPUT_PIXELS
                )));
            }

            // PDFium already honours the stored /Rotate; only the delta remains.
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| ConvertError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })?;
            let image = rotate_image(bitmap.as_image(), pages.rotation());
            debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
            out.push((idx, image));
        }

        Ok(out)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn load(bytes: &[u8]) -> Result<Document, ConvertError> {
    Document::load_mem(bytes).map_err(|e| ConvertError::CorruptDocument(e.to_string()))
}

fn save(doc: &mut Document) -> Result<Vec<u8>, ConvertError> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ConvertError::DocumentOperation(format!("save failed: {e}")))?;
    Ok(buffer)
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(&path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

/// Look `key` up on the page, then on each ancestor.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn degrees_of(obj: &Object) -> i64 {
    match obj {
        Object::Integer(n) => *n,
        Object::Real(r) => *r as i64,
        _ => 0,
    }
}

fn stored_rotation(doc: &Document, page_id: ObjectId) -> Rotation {
    let degrees = inherited(doc, page_id, b"Rotate").map(|o| degrees_of(&o)).unwrap_or(0);
    Rotation::from_degrees(degrees).unwrap_or_default()
}

/// Make a page self-contained, re-parent it, and apply the rotation delta.
fn adopt_page(
    doc: &mut Document,
    page_id: ObjectId,
    parent: ObjectId,
    delta: Rotation,
) -> lopdf::Result<()> {
    let carried: Vec<(&[u8], Object)> = INHERITABLE
        .iter()
        .filter_map(|&key| inherited(doc, page_id, key).map(|v| (key, v)))
        .collect();
    let stored = stored_rotation(doc, page_id);

    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    for (key, value) in carried {
        page.set(key.to_vec(), value);
    }
    page.set("Parent", Object::Reference(parent));
    page.set("Rotate", Object::Integer(stored.add(delta).degrees() as i64));
    Ok(())
}

fn rotate_image(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Deg0 => img,
        Rotation::Deg90 => img.rotate90(),
        Rotation::Deg180 => img.rotate180(),
        Rotation::Deg270 => img.rotate270(),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn engine() -> DocumentEngine {
        DocumentEngine::default()
    }

    #[test]
    fn metadata_counts_pages_and_inherited_rotation() {
        let pdf = create_test_pdf(3, "A", Some(270));
        let meta = engine().load_metadata(&pdf).unwrap();
        assert_eq!(meta.page_count, 3);
        assert_eq!(meta.page_rotations, vec![Rotation::Deg270; 3]);
    }

    #[test]
    fn corrupt_bytes_are_corrupt_document() {
        let err = engine().load_metadata(b"%PDF-1.7 garbage").unwrap_err();
        assert!(matches!(err, ConvertError::CorruptDocument(_)));
    }

    #[test]
    fn merge_keeps_input_order_and_ascending_pages() {
        let a = create_test_pdf(3, "A", None);
        let b = create_test_pdf(2, "B", None);
        // Selection given out of order still comes out ascending.
        let sel_a = PageSet::with_pages(3, [2, 0]).unwrap();
        let sel_b = PageSet::all(2);

        let merged = engine()
            .build_merged(&[
                MergeInput {
                    name: "b.pdf",
                    bytes: &b,
                    pages: &sel_b,
                },
                MergeInput {
                    name: "a.pdf",
                    bytes: &a,
                    pages: &sel_a,
                },
            ])
            .unwrap();

        let markers: Vec<_> = describe(&merged).into_iter().map(|(m, _)| m).collect();
        assert_eq!(markers, ["B-Page-1", "B-Page-2", "A-Page-1", "A-Page-3"]);
    }

    #[test]
    fn merge_accumulates_rotation_onto_inherited_value() {
        let a = create_test_pdf(1, "A", Some(90));
        let b = create_test_pdf(1, "B", Some(270));
        let sel_a = PageSet::all(1).with_rotation(Rotation::Deg90);
        let sel_b = PageSet::all(1).with_rotation(Rotation::Deg180);

        let merged = engine()
            .build_merged(&[
                MergeInput {
                    name: "a.pdf",
                    bytes: &a,
                    pages: &sel_a,
                },
                MergeInput {
                    name: "b.pdf",
                    bytes: &b,
                    pages: &sel_b,
                },
            ])
            .unwrap();

        assert_eq!(
            describe(&merged),
            [("A-Page-1".to_string(), 180), ("B-Page-1".to_string(), 90)]
        );
    }

    #[test]
    fn merge_carries_inherited_media_box() {
        let a = create_test_pdf(1, "A", None);
        let merged = engine()
            .build_merged(&[MergeInput {
                name: "a.pdf",
                bytes: &a,
                pages: &PageSet::all(1),
            }])
            .unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let media_box = doc.get_dictionary(page_id).unwrap().get(b"MediaBox").unwrap();
        assert_eq!(media_box.as_array().unwrap().len(), 4);
    }

    #[test]
    fn merge_with_bad_input_fails_whole_operation() {
        let a = create_test_pdf(2, "A", None);
        let sel = PageSet::all(2);
        let err = engine()
            .build_merged(&[
                MergeInput {
                    name: "a.pdf",
                    bytes: &a,
                    pages: &sel,
                },
                MergeInput {
                    name: "bad.pdf",
                    bytes: b"nope",
                    pages: &sel,
                },
            ])
            .unwrap_err();
        assert!(matches!(err, ConvertError::CorruptDocument(_)));
    }

    #[test]
    fn selection_beyond_real_page_count_is_operation_failure() {
        let a = create_test_pdf(2, "A", None);
        // Captured count claims 5 pages; the file has 2.
        let sel = PageSet::with_pages(5, [4]).unwrap();
        let err = engine().extract_subset("a.pdf", &a, &sel).unwrap_err();
        assert!(matches!(err, ConvertError::DocumentOperation(_)));
    }

    #[test]
    fn empty_merge_is_rejected() {
        assert!(engine().build_merged(&[]).is_err());
    }

    #[test]
    fn extract_subset_is_standalone() {
        let a = create_test_pdf(4, "A", None);
        let sel = PageSet::with_pages(4, [1, 3]).unwrap().with_rotation(Rotation::Deg270);
        let out = engine().extract_subset("a.pdf", &a, &sel).unwrap();
        assert_eq!(
            describe(&out),
            [("A-Page-2".to_string(), 270), ("A-Page-4".to_string(), 270)]
        );
        assert_eq!(engine().load_metadata(&out).unwrap().page_count, 2);
    }

    #[test]
    fn compress_drops_info_dictionary() {
        let a = create_test_pdf(2, "A", None);
        let out = engine().compress(&a).unwrap();
        let doc = Document::load_mem(&out).unwrap();
        assert!(doc.trailer.get(b"Info").is_err());
        assert_eq!(doc.get_pages().len(), 2);
        assert!(!String::from_utf8_lossy(&out).contains("Secret title"));
    }

    #[test]
    fn bad_render_scale_is_invalid_spec() {
        let a = create_test_pdf(1, "A", None);
        // Rejected before PDFium is even looked for.
        let engine = DocumentEngine::new(Some("/nonexistent/libpdfium.so".into()));
        for scale in [0.0, 0.1, -2.0, 1000.0, f32::NAN, f32::INFINITY] {
            let err = engine.rasterize_pages(&a, &PageSet::all(1), scale).unwrap_err();
            assert!(matches!(err, ConvertError::InvalidSpec(_)), "scale {scale}: {err}");
        }
        let err = engine.rasterize_page(&a, 0, Rotation::Deg0, 100.0).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSpec(_)));
    }

    #[test]
    fn missing_pdfium_is_engine_unavailable() {
        let engine = DocumentEngine::new(Some("/nonexistent/libpdfium.so".into()));
        match engine.bind_pdfium() {
            Err(ConvertError::EngineUnavailable { engine, .. }) => assert_eq!(engine, "pdfium"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("binding should fail"),
        }
    }
}

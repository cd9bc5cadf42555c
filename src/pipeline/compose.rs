//! Grid composition: place normalised covers onto fixed-cell PDF pages.
//!
//! Covers are packed densely in placement order: the i-th *placed* cover
//! takes slot i of [`PageGeometry::slot`], so failed items leave no gaps.
//! Pages are opened lazily when the first cover for them arrives; a run that
//! places `n` covers therefore produces exactly `ceil(n / items_per_page)`
//! pages.
//!
//! The JPEG bytes written by the normalise stage are embedded unchanged as
//! `DCTDecode` image XObjects and drawn at the nominal cell size; the
//! oversampled pixels only affect print sharpness.

use crate::pipeline::geometry::{GridSlot, PageGeometry, MM_TO_PT};
use crate::pipeline::normalize::NormalizedImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where one source URL ended up in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub source_url: String,
    /// 0-based page.
    pub page: usize,
    pub col: usize,
    pub row: usize,
    /// Left edge from the page's left side.
    pub x_mm: f64,
    /// Top edge from the page's top side.
    pub y_mm: f64,
}

impl Placement {
    fn new(source_url: &str, slot: GridSlot) -> Self {
        Self {
            source_url: source_url.to_string(),
            page: slot.page,
            col: slot.col,
            row: slot.row,
            x_mm: slot.x_mm,
            y_mm: slot.y_mm,
        }
    }
}

/// Page under construction.
struct OpenPage {
    operations: Vec<Operation>,
    xobjects: Dictionary,
}

/// A multi-page PDF being filled one cover at a time.
pub struct GridDocument {
    doc: Document,
    pages_id: ObjectId,
    geometry: PageGeometry,
    page_ids: Vec<ObjectId>,
    open: Option<OpenPage>,
    placed: usize,
}

impl GridDocument {
    pub fn new(geometry: PageGeometry) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            geometry,
            page_ids: Vec::new(),
            open: None,
            placed: 0,
        }
    }

    /// Covers placed so far.
    pub fn placed(&self) -> usize {
        self.placed
    }

    /// Pages started so far, including the open one.
    pub fn page_count(&self) -> usize {
        self.page_ids.len() + usize::from(self.open.is_some())
    }

    /// Read the normalised JPEG from disk and place it in the next slot.
    pub fn place_file(
        &mut self,
        source_url: &str,
        image: &NormalizedImage,
    ) -> Result<Placement, String> {
        let jpeg = std::fs::read(&image.path)
            .map_err(|e| format!("cannot read '{}': {e}", image.path.display()))?;
        self.place_jpeg(source_url, jpeg, image.width, image.height)
    }

    /// Place baseline RGB JPEG bytes of the given pixel size in the next slot.
    pub fn place_jpeg(
        &mut self,
        source_url: &str,
        jpeg: Vec<u8>,
        width_px: u32,
        height_px: u32,
    ) -> Result<Placement, String> {
        if width_px == 0 || height_px == 0 {
            return Err(format!("image has zero size {width_px}x{height_px}"));
        }

        let slot = self.geometry.slot(self.placed);
        if slot.page >= self.page_count() {
            self.flush_page()?;
            self.open = Some(OpenPage {
                operations: Vec::new(),
                xobjects: Dictionary::new(),
            });
            debug!("Started page {}", slot.page + 1);
        }

        let image_id = self.doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(i64::from(width_px)),
                    "Height" => Object::Integer(i64::from(height_px)),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => Object::Integer(8),
                    "Filter" => "DCTDecode",
                },
                jpeg,
            )
            .with_compression(false),
        );

        let (cell_w_mm, cell_h_mm) = self.geometry.cell_size_mm();
        let (_, page_h_pt) = self.geometry.page_size_pt();
        let w = (cell_w_mm * MM_TO_PT) as f32;
        let h = (cell_h_mm * MM_TO_PT) as f32;
        let x = (slot.x_mm * MM_TO_PT) as f32;
        // PDF y grows upwards from the bottom edge.
        let y = (page_h_pt - (slot.y_mm + cell_h_mm) * MM_TO_PT) as f32;

        let page = self
            .open
            .as_mut()
            .ok_or_else(|| "no open page".to_string())?;
        let name = format!("Im{}", page.xobjects.len());
        page.xobjects.set(name.as_bytes().to_vec(), image_id);
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    w.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    h.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);

        self.placed += 1;
        Ok(Placement::new(source_url, slot))
    }

    /// Close the open page, if any, and register it with the page tree.
    fn flush_page(&mut self) -> Result<(), String> {
        let Some(page) = self.open.take() else {
            return Ok(());
        };
        let content = Content {
            operations: page.operations,
        };
        let encoded = content.encode().map_err(|e| e.to_string())?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

        let (w_pt, h_pt) = self.geometry.page_size_pt();
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => page.xobjects,
            },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::from(w_pt as f32),
                Object::from(h_pt as f32),
            ],
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Finalise the page tree and write the PDF to `path` atomically.
    ///
    /// Returns the number of pages written.
    pub fn save(mut self, path: &Path) -> Result<usize, String> {
        self.flush_page()?;
        let page_count = self.page_ids.len();

        let kids: Vec<Object> = self.page_ids.iter().map(|&id| id.into()).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(page_count as i64),
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Producer" => Object::string_literal("covergrid"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);
        self.doc.compress();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let tmp_path = tmp_path_for(path);
        self.doc.save(&tmp_path).map_err(|e| e.to_string())?;
        std::fs::rename(&tmp_path, path).map_err(|e| e.to_string())?;

        info!("Wrote {} pages to {}", page_count, path.display());
        Ok(page_count)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::encode_jpeg;
    use image::{Rgb, RgbImage};

    fn small_grid() -> PageGeometry {
        // 2 × 2 per page.
        PageGeometry::new(100.0, 100.0, 40.0, 40.0, 5.0, 5.0, 5.0).unwrap()
    }

    fn jpeg() -> Vec<u8> {
        encode_jpeg(&RgbImage::from_pixel(8, 8, Rgb([50, 60, 70])), 90).unwrap()
    }

    fn real(o: &Object) -> f32 {
        match o {
            Object::Real(v) => *v as f32,
            Object::Integer(i) => *i as f32,
            other => panic!("not a number: {other:?}"),
        }
    }

    fn draws_per_page(path: &Path) -> Vec<Vec<(f32, f32)>> {
        let doc = Document::load(path).expect("load pdf");
        doc.get_pages()
            .values()
            .map(|&id| {
                let content = Content::decode(&doc.get_page_content(id).unwrap()).unwrap();
                content
                    .operations
                    .iter()
                    .filter(|op| op.operator == "cm")
                    .map(|op| (real(&op.operands[4]), real(&op.operands[5])))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn five_covers_on_a_four_slot_grid_make_two_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.pdf");
        let mut grid = GridDocument::new(small_grid());

        let placements: Vec<Placement> = (0..5)
            .map(|i| grid.place_jpeg(&format!("u{i}"), jpeg(), 8, 8).unwrap())
            .collect();
        assert_eq!(grid.page_count(), 2);
        assert_eq!(
            placements.iter().map(|p| (p.page, p.col, p.row)).collect::<Vec<_>>(),
            vec![(0, 0, 0), (0, 1, 0), (0, 0, 1), (0, 1, 1), (1, 0, 0)]
        );

        assert_eq!(grid.save(&path).unwrap(), 2);
        assert!(!tmp_path_for(&path).exists());

        let draws = draws_per_page(&path);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].len(), 4);
        assert_eq!(draws[1].len(), 1);

        // Top-left cell: x = 5mm, top edge 5mm below page top.
        let (x, y) = draws[1][0];
        assert!((x as f64 - 5.0 * MM_TO_PT).abs() < 0.01, "x = {x}");
        assert!((y as f64 - (100.0 - 45.0) * MM_TO_PT).abs() < 0.01, "y = {y}");
    }

    #[test]
    fn cells_are_drawn_at_physical_size_not_pixel_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pdf");
        let mut grid = GridDocument::new(small_grid());
        grid.place_jpeg("u", jpeg(), 8, 8).unwrap();
        grid.save(&path).unwrap();

        let doc = Document::load(&path).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let cm = content.operations.iter().find(|op| op.operator == "cm").unwrap();
        assert!((real(&cm.operands[0]) as f64 - 40.0 * MM_TO_PT).abs() < 0.01);
        assert!((real(&cm.operands[3]) as f64 - 40.0 * MM_TO_PT).abs() < 0.01);
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let mut grid = GridDocument::new(small_grid());
        assert!(grid.place_jpeg("u", jpeg(), 0, 8).is_err());
        assert_eq!(grid.placed(), 0);
        assert_eq!(grid.page_count(), 0);
    }

    #[test]
    fn place_file_reads_scratch_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("1.jpg");
        std::fs::write(&img_path, jpeg()).unwrap();
        let mut grid = GridDocument::new(small_grid());
        let image = NormalizedImage {
            path: img_path,
            width: 8,
            height: 8,
        };
        let p = grid.place_file("https://a.example/1", &image).unwrap();
        assert_eq!(p.source_url, "https://a.example/1");

        let missing = NormalizedImage {
            path: dir.path().join("missing.jpg"),
            width: 8,
            height: 8,
        };
        assert!(grid.place_file("u", &missing).is_err());
        assert_eq!(grid.placed(), 1);
    }
}

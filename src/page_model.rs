use crate::error::DocMergeError;

/// Reserved marker separating pages in a joined template string.
pub const PAGE_DELIMITER: &str = r#"<div class="page-break-delimiter"></div>"#;

/// Class token carried by the delimiter element.
pub const PAGE_DELIMITER_CLASS: &str = "page-break-delimiter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// An ordered, never-empty list of HTML page fragments plus the editor's
/// active-page cursor.
///
/// Every index-taking operation rejects out-of-range indices with
/// [`DocMergeError::InvalidPageIndex`] and leaves the model untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageModel {
    pages: Vec<String>,
    active: usize,
}

impl Default for PageModel {
    fn default() -> Self {
        Self {
            pages: vec![String::new()],
            active: 0,
        }
    }
}

impl PageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit pages. An empty list becomes one empty page.
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pages: Vec<String> = pages.into_iter().map(Into::into).collect();
        if pages.is_empty() {
            pages.push(String::new());
        }
        Self { pages, active: 0 }
    }

    /// Split a joined template on the delimiter. Content without any
    /// delimiter is a single page.
    pub fn split(html: &str) -> Self {
        Self::from_pages(html.split(PAGE_DELIMITER))
    }

    pub fn join(&self) -> String {
        self.pages.join(PAGE_DELIMITER)
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn page(&self, index: usize) -> Result<&str, DocMergeError> {
        self.check_index(index)?;
        Ok(&self.pages[index])
    }

    pub fn set_active(&mut self, index: usize) -> Result<(), DocMergeError> {
        self.check_index(index)?;
        self.active = index;
        Ok(())
    }

    /// Append an empty page and make it active. Returns its index.
    pub fn add_page(&mut self) -> usize {
        self.pages.push(String::new());
        self.active = self.pages.len() - 1;
        self.active
    }

    /// Insert an empty page right after `index` and make it active.
    pub fn insert_page_after(&mut self, index: usize) -> Result<usize, DocMergeError> {
        self.check_index(index)?;
        let at = index + 1;
        self.pages.insert(at, String::new());
        self.active = at;
        Ok(at)
    }

    pub fn update_page(&mut self, index: usize, html: impl Into<String>) -> Result<(), DocMergeError> {
        self.check_index(index)?;
        self.pages[index] = html.into();
        Ok(())
    }

    /// Delete a page after asking `confirm`. Returns whether a page was
    /// removed; the last remaining page is never removed.
    pub fn delete_page<F>(&mut self, index: usize, confirm: F) -> Result<bool, DocMergeError>
    where
        F: FnOnce(usize, &str) -> bool,
    {
        self.check_index(index)?;
        if self.pages.len() <= 1 {
            return Ok(false);
        }
        if !confirm(index, &self.pages[index]) {
            return Ok(false);
        }
        self.pages.remove(index);
        if self.active > index {
            self.active -= 1;
        }
        self.active = self.active.min(self.pages.len() - 1);
        Ok(true)
    }

    /// Swap a page with its neighbour. Returns `false` at either boundary.
    pub fn move_page(&mut self, index: usize, direction: MoveDirection) -> Result<bool, DocMergeError> {
        self.check_index(index)?;
        let target = match direction {
            MoveDirection::Up if index == 0 => return Ok(false),
            MoveDirection::Up => index - 1,
            MoveDirection::Down if index + 1 >= self.pages.len() => return Ok(false),
            MoveDirection::Down => index + 1,
        };
        self.pages.swap(index, target);
        if self.active == index {
            self.active = target;
        } else if self.active == target {
            self.active = index;
        }
        Ok(true)
    }

    fn check_index(&self, index: usize) -> Result<(), DocMergeError> {
        if index < self.pages.len() {
            Ok(())
        } else {
            Err(DocMergeError::InvalidPageIndex {
                index,
                len: self.pages.len(),
            })
        }
    }
}

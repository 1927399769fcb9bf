//! The authoritative outline document and the refresh contract over it.
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{info, instrument, warn};

use crate::controller::OutlineNodeController;
use crate::error::{Notices, OutlineError, ServiceError};
use crate::model::{CourseOutline, OutlineNode};
use crate::service::{PostChangeRefresh, StudioService};

pub struct OutlineSession {
    service: Arc<dyn StudioService>,
    outline: CourseOutline,
    notices: Notices,
}

impl OutlineSession {
    #[instrument(skip_all, fields(course_id = %course_id))]
    pub async fn load(
        service: Arc<dyn StudioService>,
        course_id: &str,
    ) -> Result<Self, ServiceError> {
        let outline = service.fetch_outline(course_id).await?;
        info!(sections = outline.sections.len(), "outline loaded");
        Ok(Self {
            service,
            outline,
            notices: Notices::default(),
        })
    }

    pub fn service(&self) -> Arc<dyn StudioService> {
        Arc::clone(&self.service)
    }

    pub fn outline(&self) -> &CourseOutline {
        &self.outline
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut Notices {
        &mut self.notices
    }

    /// Record a failure as a dismissible notice. Returns the notice id.
    pub fn report(&mut self, err: &OutlineError) -> u64 {
        warn!(error = %err, "operation failed");
        self.notices.push(err)
    }

    pub fn controller(&self, id: &str) -> Option<OutlineNodeController> {
        self.outline.context(id).map(OutlineNodeController::new)
    }

    /// Controllers for every node in the outline, depth-first in display order.
    pub fn controllers(&self) -> Vec<OutlineNodeController> {
        fn walk(outline: &CourseOutline, node: &OutlineNode, out: &mut Vec<OutlineNodeController>) {
            if let Some(ctx) = outline.context(&node.id) {
                out.push(OutlineNodeController::new(ctx));
            }
            for child in &node.children {
                walk(outline, child, out);
            }
        }
        let mut out = Vec::new();
        for section in &self.outline.sections {
            walk(&self.outline, section, &mut out);
        }
        out
    }

    /// Refetch every section concurrently and replace them all.
    #[instrument(skip_all)]
    pub async fn refresh_all(&mut self) -> Result<(), ServiceError> {
        let service = Arc::clone(&self.service);
        let fetches = self
            .outline
            .sections
            .iter()
            .map(|s| {
                let service = Arc::clone(&service);
                let id = s.id.clone();
                async move { service.fetch_section(&id).await }
            })
            .collect::<Vec<_>>();
        let sections = try_join_all(fetches).await?;
        for section in sections {
            self.outline.replace_section(section);
        }
        info!(sections = self.outline.sections.len(), "all sections refreshed");
        Ok(())
    }
}

#[async_trait]
impl PostChangeRefresh for OutlineSession {
    #[instrument(skip_all, fields(section_id = %section_id, scroll = scroll))]
    async fn refresh_section(
        &mut self,
        section_id: &str,
        scroll: bool,
    ) -> Result<OutlineNode, ServiceError> {
        let mut section = self.service.fetch_section(section_id).await?;
        section.should_scroll = scroll;
        if !self.outline.replace_section(section.clone()) {
            warn!("refreshed section is not part of the loaded outline");
        }
        Ok(section)
    }

    #[instrument(skip_all, fields(scroll_to = ?scroll_to))]
    async fn refresh_outline(
        &mut self,
        scroll_to: Option<&str>,
    ) -> Result<CourseOutline, ServiceError> {
        let mut outline = self.service.fetch_outline(&self.outline.course_id).await?;
        if let Some(id) = scroll_to {
            match outline.sections.iter_mut().find(|s| s.id == id) {
                Some(section) => section.should_scroll = true,
                None => warn!(id, "scroll target missing from refreshed outline"),
            }
        }
        self.outline = outline;
        Ok(self.outline.clone())
    }
}

//! Default pipeline: chains item processors, optionally failing fast.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::data::Item;
use crate::error::{CrawlerError, ErrorKind, IllegalParameterError};
use crate::module::base::{impl_module_delegate, ModuleBase};
use crate::module::{CalculateScore, ModuleError, Pipeline, ProcessItem, MID};
use crate::utils;

pub struct LocalPipeline {
    base: ModuleBase,
    item_processors: Vec<ProcessItem>,
    fail_fast: AtomicBool,
}

impl LocalPipeline {
    pub fn new(
        mid: MID,
        item_processors: Vec<ProcessItem>,
        score_calculator: Option<CalculateScore>,
    ) -> Result<Self, ModuleError> {
        if item_processors.is_empty() {
            return Err(ModuleError::IllegalParameter(
                "empty item processor list".to_string(),
            ));
        }
        Ok(LocalPipeline {
            base: ModuleBase::new(mid, score_calculator)?,
            item_processors,
            fail_fast: AtomicBool::new(false),
        })
    }
}

impl_module_delegate!(LocalPipeline, |this: &LocalPipeline| {
    let mut summary = this.base.summary();
    summary.extra = Some(serde_json::json!({
        "fail_fast": this.fail_fast(),
        "processor_number": this.item_processors.len(),
    }));
    summary
});

impl Pipeline for LocalPipeline {
    fn item_processors(&self) -> Vec<ProcessItem> {
        self.item_processors.clone()
    }

    fn send(&self, item: Item) -> Vec<CrawlerError> {
        let _handling = self.base.start_handling();
        self.base.incr_called_count();
        let mut errors = Vec::new();
        if item.is_empty() {
            errors.push(CrawlerError::by(
                ErrorKind::Pipeline,
                &IllegalParameterError::new("invalid item"),
            ));
            return errors;
        }
        self.base.incr_accepted_count();
        utils::log(&format!("Process the item ({} keys)...", item.len()));
        let mut current = item;
        for processor in &self.item_processors {
            match processor(&current) {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(err) => {
                    errors.push(err);
                    if self.fail_fast() {
                        break;
                    }
                }
            }
        }
        if errors.is_empty() {
            self.base.incr_completed_count();
        }
        errors
    }

    fn fail_fast(&self) -> bool {
        self.fail_fast.load(Ordering::SeqCst)
    }

    fn set_fail_fast(&self, fail_fast: bool) {
        self.fail_fast.store(fail_fast, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::module::{gen_mid, Module, Type};

    fn counting_failure(counter: Arc<AtomicU32>) -> ProcessItem {
        Arc::new(move |_item: &Item| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CrawlerError::new(ErrorKind::Pipeline, "boom"))
        })
    }

    fn item_with(key: &str) -> Item {
        let mut item = Item::new();
        item.insert(key.to_string(), serde_json::json!(true));
        item
    }

    #[test]
    fn rejects_empty_processor_list() {
        assert!(
            LocalPipeline::new(gen_mid(Type::Pipeline, 1, None), Vec::new(), None).is_err()
        );
    }

    #[test]
    fn processors_chain_on_the_latest_item() {
        let tagger: ProcessItem = Arc::new(|item: &Item| {
            let mut next = item.clone();
            next.insert("tagged".to_string(), serde_json::json!(true));
            Ok(Some(next))
        });
        let checker: ProcessItem = Arc::new(|item: &Item| {
            assert!(item.contains_key("tagged"), "must see stage-one output");
            Ok(None)
        });
        let pipeline = LocalPipeline::new(
            gen_mid(Type::Pipeline, 1, None),
            vec![tagger, checker],
            None,
        )
        .unwrap();
        let errors = pipeline.send(item_with("url"));
        assert!(errors.is_empty());
        assert_eq!(pipeline.completed_count(), 1);
    }

    #[test]
    fn fail_fast_stops_after_the_first_error() {
        let first_runs = Arc::new(AtomicU32::new(0));
        let second_runs = Arc::new(AtomicU32::new(0));
        let pipeline = LocalPipeline::new(
            gen_mid(Type::Pipeline, 2, None),
            vec![
                counting_failure(Arc::clone(&first_runs)),
                counting_failure(Arc::clone(&second_runs)),
            ],
            None,
        )
        .unwrap();

        pipeline.set_fail_fast(true);
        assert!(pipeline.fail_fast());
        let errors = pipeline.send(item_with("a"));
        assert_eq!(errors.len(), 1);
        assert_eq!(first_runs.load(Ordering::SeqCst), 1);
        assert_eq!(second_runs.load(Ordering::SeqCst), 0);

        pipeline.set_fail_fast(false);
        let errors = pipeline.send(item_with("b"));
        assert_eq!(errors.len(), 2);
        assert_eq!(second_runs.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.completed_count(), 0);
    }

    #[test]
    fn empty_item_is_rejected_without_acceptance() {
        let noop: ProcessItem = Arc::new(|_item: &Item| Ok(None));
        let pipeline =
            LocalPipeline::new(gen_mid(Type::Pipeline, 3, None), vec![noop], None).unwrap();
        let errors = pipeline.send(Item::new());
        assert_eq!(errors.len(), 1);
        assert_eq!(pipeline.called_count(), 1);
        assert_eq!(pipeline.accepted_count(), 0);
    }

    #[test]
    fn summary_reports_fail_fast_and_processor_number() {
        let noop: ProcessItem = Arc::new(|_item: &Item| Ok(None));
        let pipeline = LocalPipeline::new(
            gen_mid(Type::Pipeline, 4, None),
            vec![Arc::clone(&noop), noop],
            None,
        )
        .unwrap();
        let summary = pipeline.summary();
        let extra = summary.extra.expect("pipeline summary carries extra");
        assert_eq!(extra["fail_fast"], serde_json::json!(false));
        assert_eq!(extra["processor_number"], serde_json::json!(2));
    }
}

// CloudWatch metrics recorder
//
// Counters recorded through the `metrics` facade land in the CloudWatch
// namespace of the project, without dimensions and with unit `None`. The
// lambdas print Embedded Metric Format lines that CloudWatch Logs extracts;
// the CodeBuild driver buffers them and sends one `PutMetricData` at exit.
// Labels are dropped: the namespace already names the project.

use anyhow::Result;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::types::{MetricDatum, StandardUnit};
use metrics::{
    Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Where recorded values go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsSink {
    /// One EMF line per increment on stdout
    Emf,
    /// Summed in memory until `flush`
    Buffered,
}

enum Sink {
    Emf(Mutex<Box<dyn Write + Send>>),
    Buffered(Mutex<BTreeMap<String, f64>>),
}

struct Inner {
    namespace: String,
    sink: Sink,
}

impl Inner {
    fn emit(&self, name: &str, value: f64) {
        match &self.sink {
            Sink::Emf(out) => {
                let now = chrono::Utc::now().timestamp_millis();
                let line = emf_line(&self.namespace, name, value, now);
                let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                    warn!(error = %e, metric = name, "Failed to write EMF record");
                }
            }
            Sink::Buffered(values) => {
                let mut values = values.lock().unwrap_or_else(PoisonError::into_inner);
                *values.entry(name.to_string()).or_insert(0.0) += value;
            }
        }
    }
}

/// EMF record for one value of one metric
fn emf_line(namespace: &str, name: &str, value: f64, timestamp_ms: i64) -> serde_json::Value {
    json!({
        "_aws": {
            "Timestamp": timestamp_ms,
            "CloudWatchMetrics": [{
                "Namespace": namespace,
                "Dimensions": [[]],
                "Metrics": [{"Name": name, "Unit": "None"}]
            }]
        },
        name: value,
    })
}

/// `metrics::Recorder` publishing counters to CloudWatch
#[derive(Clone)]
pub struct CloudWatchRecorder {
    inner: Arc<Inner>,
}

impl CloudWatchRecorder {
    pub fn new(namespace: impl Into<String>, sink: MetricsSink) -> Self {
        let sink = match sink {
            MetricsSink::Emf => Sink::Emf(Mutex::new(Box::new(std::io::stdout()))),
            MetricsSink::Buffered => Sink::Buffered(Mutex::new(BTreeMap::new())),
        };
        Self::with_sink(namespace, sink)
    }

    /// EMF recorder writing to `out` instead of stdout
    pub fn emf_to(namespace: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self::with_sink(namespace, Sink::Emf(Mutex::new(out)))
    }

    fn with_sink(namespace: impl Into<String>, sink: Sink) -> Self {
        Self {
            inner: Arc::new(Inner {
                namespace: namespace.into(),
                sink,
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Remove and return the buffered totals; always empty for EMF
    pub fn take_buffered(&self) -> BTreeMap<String, f64> {
        match &self.inner.sink {
            Sink::Buffered(values) => {
                std::mem::take(&mut *values.lock().unwrap_or_else(PoisonError::into_inner))
            }
            Sink::Emf(_) => BTreeMap::new(),
        }
    }

    /// Send the buffered totals with `PutMetricData`. Returns how many
    /// metrics were sent; values are dropped if the call fails.
    pub async fn flush(&self, client: &aws_sdk_cloudwatch::Client) -> Result<usize> {
        let values = self.take_buffered();
        if values.is_empty() {
            return Ok(0);
        }

        let data = values
            .iter()
            .map(|(name, value)| {
                MetricDatum::builder()
                    .metric_name(name)
                    .value(*value)
                    .unit(StandardUnit::None)
                    .build()
            })
            .collect::<Vec<_>>();

        client
            .put_metric_data()
            .namespace(self.namespace())
            .set_metric_data(Some(data))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("PutMetricData failed: {}", DisplayErrorContext(&e)))?;

        info!(namespace = %self.namespace(), metrics = values.len(), "Sent CloudWatch metrics");
        Ok(values.len())
    }
}

struct CloudWatchCounter {
    name: String,
    inner: Arc<Inner>,
}

impl CounterFn for CloudWatchCounter {
    fn increment(&self, value: u64) {
        self.inner.emit(&self.name, value as f64);
    }

    fn absolute(&self, value: u64) {
        self.inner.emit(&self.name, value as f64);
    }
}

impl Recorder for CloudWatchRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CloudWatchCounter {
            name: key.name().to_string(),
            inner: self.inner.clone(),
        }))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::{BehaviorVersion, Region, SdkConfig};
    use metrics::counter;

    /// Shared buffer standing in for stdout
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<serde_json::Value> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    #[test]
    fn test_emf_line_shape() {
        let line = emf_line("cbmc-ci", "Attempts", 1.0, 1_600_000_000_000);
        let directive = &line["_aws"]["CloudWatchMetrics"][0];
        assert_eq!(line["_aws"]["Timestamp"], 1_600_000_000_000i64);
        assert_eq!(directive["Namespace"], "cbmc-ci");
        assert_eq!(directive["Dimensions"], json!([[]]));
        assert_eq!(directive["Metrics"][0]["Name"], "Attempts");
        assert_eq!(directive["Metrics"][0]["Unit"], "None");
        assert_eq!(line["Attempts"], 1.0);
    }

    #[test]
    fn test_emf_counters() {
        let out = Captured::default();
        let recorder = CloudWatchRecorder::emf_to("s2n-ci", Box::new(out.clone()));
        metrics::with_local_recorder(&recorder, || {
            counter!("Successes", "project" => "s2n-ci").increment(1);
            counter!("GitHub status update failed").increment(1);
        });

        let lines = out.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["Successes"], 1.0);
        assert_eq!(lines[0]["_aws"]["CloudWatchMetrics"][0]["Namespace"], "s2n-ci");
        // Labels do not become dimensions or fields
        assert!(lines[0].get("project").is_none());
        assert_eq!(lines[1]["GitHub status update failed"], 1.0);
        assert!(recorder.take_buffered().is_empty());
    }

    #[test]
    fn test_buffered_counters_are_summed() {
        let recorder = CloudWatchRecorder::new("cbmc-ci", MetricsSink::Buffered);
        metrics::with_local_recorder(&recorder, || {
            counter!("Attempts").increment(1);
            counter!("Attempts").increment(1);
            counter!("Errors").increment(1);
            metrics::gauge!("ignored").set(3.0);
        });

        let values = recorder.take_buffered();
        assert_eq!(values.get("Attempts"), Some(&2.0));
        assert_eq!(values.get("Errors"), Some(&1.0));
        assert_eq!(values.len(), 2);
        assert!(recorder.take_buffered().is_empty());
    }

    #[tokio::test]
    async fn test_flush_without_values_makes_no_call() {
        let config = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-west-2"))
            .build();
        let client = aws_sdk_cloudwatch::Client::new(&config);
        let recorder = CloudWatchRecorder::new("cbmc-ci", MetricsSink::Buffered);
        assert_eq!(recorder.flush(&client).await.unwrap(), 0);
    }
}

pub mod crm;
pub mod enrichment;
pub mod fetcher;
pub mod llm;
pub mod report;
pub mod website;

#[cfg(test)]
mod test_server;

pub use crm::WebhookCrmIntegrator;
pub use enrichment::HttpEnricher;
pub use fetcher::ReqwestFetcher;
pub use llm::OpenAiAnalyzer;
pub use report::MarkdownReportGenerator;
pub use website::HtmlWebsiteExtractor;

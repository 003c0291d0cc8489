//! Server container: wires config, pools and listeners together.

use std::sync::Arc;
use std::thread::JoinHandle;

use strand_config::{Config, ListenerConfig};
use strand_core::{HandlerPool, RunFlag, RunState};
use strand_http::Usage;
use tracing::info;

use crate::doh::DohConnection;
use crate::listener::{load_tls_config, Listener};
use crate::resolver::Resolver;
use crate::web::{RequestHandler, WebConnection};
use crate::Result;

/// The Strand server instance.
///
/// Owns the run-state flag and, while running, one handler pool and one
/// accept thread per configured listener.
pub struct Server {
    run: RunFlag,
    config: Config,
    resolver: Arc<dyn Resolver>,
    api_handler: Arc<dyn RequestHandler>,
    ui_handler: Arc<dyn RequestHandler>,
}

impl Server {
    /// Creates a server around the external collaborators: the resolver
    /// and the API/UI application layers.
    pub fn new(
        config: Config,
        resolver: Arc<dyn Resolver>,
        api_handler: Arc<dyn RequestHandler>,
        ui_handler: Arc<dyn RequestHandler>,
    ) -> Self {
        Self {
            run: RunFlag::new(),
            config,
            resolver,
            api_handler,
            ui_handler,
        }
    }

    /// A handle to the run-state flag, for signal handlers.
    pub fn run_flag(&self) -> RunFlag {
        self.run.clone()
    }

    /// Requests shutdown. Blocking loops observe it within the wait
    /// granularity.
    pub fn shutdown(&self) {
        let _ = self.run.set(RunState::Shutdown);
    }

    /// Starts all configured listeners and blocks until shutdown, then
    /// joins every accept thread and handler pool.
    pub fn run(&self) -> Result<()> {
        let mut accept_threads: Vec<JoinHandle<()>> = Vec::new();
        let mut doh_pool: Option<Arc<HandlerPool<DohConnection>>> = None;
        let mut web_pools: Vec<Arc<HandlerPool<WebConnection>>> = Vec::new();

        if let Some(cfg) = &self.config.doh {
            let pool = HandlerPool::new();
            for _ in 0..cfg.concurrency {
                let handler = DohConnection::new(
                    self.run.clone(),
                    cfg.client_timeout(),
                    self.resolver.clone(),
                    &pool,
                );
                pool.add(handler, |h| h.run_loop());
            }
            let listener = self.bind(cfg)?;
            info!(addr = %listener.local_addr(), concurrency = cfg.concurrency, "DoH listener ready");

            let accept_pool = pool.clone();
            accept_threads.push(std::thread::spawn(move || {
                listener.run(accept_pool, |handler, conn| handler.serve(conn));
            }));
            doh_pool = Some(pool);
        }

        if let Some(cfg) = &self.config.api {
            let (thread, pool) = self.start_web(Usage::Api, cfg, self.api_handler.clone())?;
            accept_threads.push(thread);
            web_pools.push(pool);
        }
        if let Some(cfg) = &self.config.ui {
            let (thread, pool) = self.start_web(Usage::Ui, cfg, self.ui_handler.clone())?;
            accept_threads.push(thread);
            web_pools.push(pool);
        }

        // Accept threads exit once the run-state reaches shutdown; handler
        // threads follow within the wait granularity.
        for thread in accept_threads {
            let _ = thread.join();
        }
        if let Some(pool) = doh_pool {
            pool.join();
        }
        for pool in web_pools {
            pool.join();
        }

        info!("server stopped");
        Ok(())
    }

    fn start_web(
        &self,
        usage: Usage,
        cfg: &ListenerConfig,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(JoinHandle<()>, Arc<HandlerPool<WebConnection>>)> {
        let pool = HandlerPool::new();
        for _ in 0..cfg.concurrency {
            let conn = WebConnection::new(
                usage,
                self.run.clone(),
                cfg.client_timeout(),
                cfg.allow.clone(),
                handler.clone(),
                &pool,
            );
            pool.add(conn, |h| h.run_loop());
        }
        let listener = self.bind(cfg)?;
        info!(addr = %listener.local_addr(), usage = %usage, concurrency = cfg.concurrency, "listener ready");

        let accept_pool = pool.clone();
        let thread = std::thread::spawn(move || {
            listener.run(accept_pool, |handler, conn| handler.serve(conn));
        });
        Ok((thread, pool))
    }

    fn bind(&self, cfg: &ListenerConfig) -> Result<Listener> {
        let tls = match &cfg.tls {
            Some(tls) => Some(load_tls_config(&tls.cert, &tls.key)?),
            None => None,
        };
        Listener::bind(cfg.listen, tls, cfg.client_timeout(), self.run.clone())
    }
}

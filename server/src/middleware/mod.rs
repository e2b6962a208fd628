pub mod caller_middleware;

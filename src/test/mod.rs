mod operations_workload;
